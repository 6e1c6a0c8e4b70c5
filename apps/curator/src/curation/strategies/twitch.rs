//! External strategies backed by the live platform's rankings.
//!
//! Flow for every strategy: ask the provider for top clips, drop clips in the
//! wrong language, import the rest into the corpus (idempotent by external
//! id), then apply the local exclusions the provider never saw (NSFW and
//! excluded tags). Provider order is preserved throughout.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{CurationStrategy, StrategyContext};
use crate::curation::error::CurationError;
use crate::curation::provider::{TimeWindow, MAX_PAGE_SIZE};
use crate::models::clip::ExternalClip;
use crate::models::script::StrategyKind;

pub const TRENDING_WINDOW_HOURS: i64 = 24;
pub const DISCOVERY_WINDOW_HOURS: i64 = 168;

/// Maps provider clips to local ids, applying language and local exclusions.
async fn import_admitted(
    ctx: &StrategyContext<'_>,
    clips: Vec<ExternalClip>,
) -> Result<Vec<Uuid>, CurationError> {
    let fetched = clips.len();
    let mut seen = HashSet::new();
    let wanted: Vec<ExternalClip> = clips
        .into_iter()
        .filter(|c| ctx.filter.admits_language(&c.language))
        .filter(|c| seen.insert(c.external_id.clone()))
        .collect();

    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    let imported = ctx
        .corpus
        .import_external(&wanted)
        .await
        .map_err(CurationError::corpus)?;

    let admitted: Vec<Uuid> = imported
        .iter()
        .filter(|c| ctx.filter.admits_imported(c))
        .map(|c| c.id)
        .collect();

    debug!(
        strategy = %ctx.script.strategy,
        fetched,
        imported = imported.len(),
        admitted = admitted.len(),
        "Imported external clips"
    );
    Ok(admitted)
}

fn page_size(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

// ────────────────────────────────────────────────────────────────────────────
// twitch_top_game
// ────────────────────────────────────────────────────────────────────────────

pub struct TwitchTopGame;

#[async_trait]
impl CurationStrategy for TwitchTopGame {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TwitchTopGame
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let game_id = ctx
            .filter
            .game_id
            .as_deref()
            .ok_or_else(|| CurationError::config("twitch_top_game strategy requires game_id"))?;

        let clips = ctx
            .provider()?
            .top_clips_for_game(game_id, None, page_size(limit))
            .await?;
        import_admitted(ctx, clips).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// twitch_top_broadcaster
// ────────────────────────────────────────────────────────────────────────────

pub struct TwitchTopBroadcaster;

#[async_trait]
impl CurationStrategy for TwitchTopBroadcaster {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TwitchTopBroadcaster
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let broadcaster_id = ctx.filter.broadcaster_id.as_deref().ok_or_else(|| {
            CurationError::config("twitch_top_broadcaster strategy requires broadcaster_id")
        })?;

        let clips = ctx
            .provider()?
            .top_clips_for_broadcaster(broadcaster_id, None, page_size(limit))
            .await?;
        import_admitted(ctx, clips).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// twitch_trending
// ────────────────────────────────────────────────────────────────────────────

pub struct TwitchTrending;

#[async_trait]
impl CurationStrategy for TwitchTrending {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TwitchTrending
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let window = TimeWindow::trailing(TRENDING_WINDOW_HOURS, ctx.as_of);
        let clips = ctx
            .provider()?
            .top_clips_across_trending_games(window, page_size(limit))
            .await?;
        import_admitted(ctx, clips).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// twitch_discovery
// ────────────────────────────────────────────────────────────────────────────

/// Configured games when present, otherwise the ranks just past the
/// mainstream tier.
pub struct TwitchDiscovery;

#[async_trait]
impl CurationStrategy for TwitchDiscovery {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TwitchDiscovery
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let provider = ctx.provider()?;
        let window = TimeWindow::trailing(DISCOVERY_WINDOW_HOURS, ctx.as_of);
        let first = page_size(limit);

        let clips = if ctx.filter.game_ids.is_empty() {
            provider.top_clips_from_non_mainstream_games(window, first).await?
        } else {
            provider
                .top_clips_for_games(&ctx.filter.game_ids, Some(window), first)
                .await?
        };
        import_admitted(ctx, clips).await
    }
}
