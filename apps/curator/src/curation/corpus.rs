//! Clip Corpus Provider: the platform's own clip analytics, consumed by the
//! local strategies.
//!
//! Implemented over Postgres by `repository::corpus::PgClipCorpus`. Every
//! query honours the resolved `ClipFilter` and never returns removed or
//! hidden clips.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::curation::filter::ClipFilter;
use crate::models::clip::{ClipStats, CreatorAggregate, ExternalClip, ImportedClip, Neighbor};
use crate::models::script::SortOrder;

/// Scored rankings evaluated by the corpus over every filtered clip. Only the
/// best `limit` ids are returned; admission thresholds and score formulas are
/// the constants of the matching strategy module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRanking {
    /// completion ÷ views among low-view, well-finished clips.
    SleeperHits,
    /// Engagement per hour for clips created in the 48 hours before `as_of`.
    ViralVelocity { as_of: DateTime<Utc> },
    /// favorites ÷ views.
    CommunityFavorites,
    /// Watch progress and votes, below the 75th view percentile.
    DeepCuts,
    /// comments ÷ views among clips with enough votes.
    Controversial,
    /// Clips by creators with few published clips.
    FreshFaces,
    /// Engagement min-max normalised within each game.
    CrossGameHits,
    /// Binge sessions per clip in watch history since `since`.
    BingeWorthy { since: DateTime<Utc> },
}

#[async_trait]
pub trait ClipCorpus: Send + Sync {
    /// Filtered clips ordered by `sort`, created after `since` when given.
    async fn ranked(
        &self,
        filter: &ClipFilter,
        sort: SortOrder,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Uuid>>;

    /// Best `limit` clips under `ranking`, best first.
    async fn rank_local(
        &self,
        filter: &ClipFilter,
        ranking: LocalRanking,
        limit: usize,
    ) -> Result<Vec<Uuid>>;

    /// Each listed creator's best clips created since `since`, at most
    /// `per_creator` each, ordered by vote score then views within a creator.
    async fn recent_clips_by_creators(
        &self,
        filter: &ClipFilter,
        creators: &[String],
        since: DateTime<Utc>,
        per_creator: usize,
    ) -> Result<Vec<ClipStats>>;

    /// Clips closest to `seed` by embedding distance, ascending. Empty when the
    /// seed has no embedding.
    async fn nearest_neighbors(
        &self,
        filter: &ClipFilter,
        seed: Uuid,
        limit: usize,
    ) -> Result<Vec<Neighbor>>;

    /// Per-creator baseline and recent-window engagement.
    async fn creator_aggregates(
        &self,
        filter: &ClipFilter,
        recent_since: DateTime<Utc>,
    ) -> Result<Vec<CreatorAggregate>>;

    /// Upserts external clips by external id and returns their local identity,
    /// in input order.
    async fn import_external(&self, clips: &[ExternalClip]) -> Result<Vec<ImportedClip>>;
}
