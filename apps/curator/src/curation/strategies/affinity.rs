//! Affinity strategies: similarity to a seed clip, comparable standouts across
//! several games, and clips that keep viewers watching.

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use super::{rank_local, CurationStrategy, StrategyContext};
use crate::curation::corpus::LocalRanking;
use crate::curation::error::CurationError;
use crate::models::clip::Neighbor;
use crate::models::script::StrategyKind;

/// A gap longer than this between two plays starts a new session.
pub const SESSION_GAP_MINUTES: i64 = 30;
/// Sessions with fewer distinct clips are not binges.
pub const BINGE_MIN_CLIPS: i64 = 3;
pub const BINGE_LOOKBACK_DAYS: i64 = 30;

// ────────────────────────────────────────────────────────────────────────────
// similar_vibes
// ────────────────────────────────────────────────────────────────────────────

pub struct SimilarVibes;

#[async_trait]
impl CurationStrategy for SimilarVibes {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SimilarVibes
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let seed = ctx
            .script
            .filters
            .seed_clip_id
            .ok_or_else(|| CurationError::config("similar_vibes strategy requires seed_clip_id"))?;

        // One extra in case the seed itself comes back.
        let neighbors = ctx
            .corpus
            .nearest_neighbors(ctx.filter, seed, limit + 1)
            .await
            .map_err(CurationError::corpus)?;

        Ok(rank_similar(seed, neighbors))
    }
}

/// Nearest first, seed excluded. A seed without an embedding yields nothing.
pub fn rank_similar(seed: Uuid, mut neighbors: Vec<Neighbor>) -> Vec<Uuid> {
    neighbors.retain(|n| n.id != seed);
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    neighbors.into_iter().map(|n| n.id).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// cross_game_hits
// ────────────────────────────────────────────────────────────────────────────

/// Engagement min-max normalised within each configured game, so a standout
/// in a small game competes with a standout in a large one. A game whose
/// clips all score the same gives each of them 1.0. Ties go to raw views.
pub struct CrossGameHits;

#[async_trait]
impl CurationStrategy for CrossGameHits {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CrossGameHits
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        if ctx.filter.game_ids.is_empty() {
            return Err(CurationError::config("cross_game_hits strategy requires game_ids"));
        }
        rank_local(ctx, LocalRanking::CrossGameHits, limit).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// binge_worthy
// ────────────────────────────────────────────────────────────────────────────

/// Clips that show up in binge sessions: runs of one viewer's plays with no
/// gap over 30 minutes covering at least 3 distinct clips. Every play counts
/// toward session detection; only clips passing the filter are returned.
/// Most binged first, then the clip binged earliest.
pub struct BingeWorthy;

#[async_trait]
impl CurationStrategy for BingeWorthy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BingeWorthy
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let since = ctx.as_of - Duration::days(BINGE_LOOKBACK_DAYS);
        rank_local(ctx, LocalRanking::BingeWorthy { since }, limit).await
    }
}
