//! Engagement-ratio strategies over per-clip signals.
//!
//! Scoring runs inside the corpus over every clip the filter admits, so an
//! old clip with a strong ratio competes with this week's uploads. The
//! constants here are the admission thresholds and weights the corpus
//! applies.

use async_trait::async_trait;
use uuid::Uuid;

use super::{rank_local, CurationStrategy, StrategyContext};
use crate::curation::corpus::LocalRanking;
use crate::curation::error::CurationError;
use crate::models::script::StrategyKind;

/// Clips above this many views are no longer sleepers.
pub const SLEEPER_MAX_VIEWS: i64 = 500;
pub const SLEEPER_MIN_COMPLETION: f64 = 0.6;

pub const VIRAL_WINDOW_HOURS: i64 = 48;
/// Younger clips have too little signal for a stable rate.
pub const VIRAL_MIN_AGE_MINUTES: i64 = 30;

pub const FAVORITES_MIN_VIEWS: i64 = 10;

pub const DEEP_CUTS_MIN_PROGRESS_SECS: f64 = 15.0;
pub const DEEP_CUTS_VIEW_PERCENTILE: f64 = 0.75;
pub const DEEP_CUTS_PROGRESS_WEIGHT: f64 = 0.6;
pub const DEEP_CUTS_VOTE_WEIGHT: f64 = 0.4;

pub const CONTROVERSIAL_MIN_VOTES: i64 = 5;
pub const CONTROVERSIAL_MIN_VIEWS: i64 = 10;

// ────────────────────────────────────────────────────────────────────────────
// sleeper_hits
// ────────────────────────────────────────────────────────────────────────────

/// Well-finished clips nobody has found yet: completion ÷ views, ties to the
/// higher vote score.
pub struct SleeperHits;

#[async_trait]
impl CurationStrategy for SleeperHits {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SleeperHits
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        rank_local(ctx, LocalRanking::SleeperHits, limit).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// viral_velocity
// ────────────────────────────────────────────────────────────────────────────

/// Fastest engagement growth over the last 48 hours. Engagement is
/// views + 10·votes + 5·comments + 3·favorites, divided by hours since upload.
pub struct ViralVelocity;

#[async_trait]
impl CurationStrategy for ViralVelocity {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ViralVelocity
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let ranking = LocalRanking::ViralVelocity { as_of: ctx.as_of };
        rank_local(ctx, ranking, limit).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// community_favorites
// ────────────────────────────────────────────────────────────────────────────

/// Highest save-to-view ratio.
pub struct CommunityFavorites;

#[async_trait]
impl CurationStrategy for CommunityFavorites {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CommunityFavorites
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        rank_local(ctx, LocalRanking::CommunityFavorites, limit).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// deep_cuts
// ────────────────────────────────────────────────────────────────────────────

/// Long dwell time and solid votes on clips that never went big.
///
/// Only clips strictly below the filtered corpus's 75th view percentile
/// (discrete, so always an observed view count) are eligible. The score is
/// 0.6 × progress ÷ max progress + 0.4 × votes ÷ max votes over the eligible
/// set.
pub struct DeepCuts;

#[async_trait]
impl CurationStrategy for DeepCuts {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DeepCuts
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        rank_local(ctx, LocalRanking::DeepCuts, limit).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// controversial
// ────────────────────────────────────────────────────────────────────────────

/// Most discussion per view, among clips with enough votes to matter.
pub struct Controversial;

#[async_trait]
impl CurationStrategy for Controversial {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Controversial
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        rank_local(ctx, LocalRanking::Controversial, limit).await
    }
}
