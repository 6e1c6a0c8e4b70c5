//! Strategy Library: pluggable, trait-based ranking algorithms.
//!
//! Every strategy implements [`CurationStrategy`] and is registered by name in
//! a [`StrategyRegistry`]. The registry post-processes every result so the
//! contract holds regardless of the implementation: at most `limit` ids, no
//! duplicates, original order preserved. A short list is a valid result.
//!
//! Two families:
//! - local strategies rank signals already held by the clip corpus
//!   (`standard`, `engagement`, `creators`, `affinity`);
//! - external strategies consult the live-platform ranking provider, import
//!   the clips locally, then apply local exclusions (`twitch`).

pub mod affinity;
pub mod creators;
pub mod engagement;
pub mod standard;
pub mod twitch;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::curation::corpus::{ClipCorpus, LocalRanking};
use crate::curation::error::CurationError;
use crate::curation::filter::ClipFilter;
use crate::curation::provider::ClipRankingProvider;
use crate::models::script::{PlaylistScript, StrategyKind};

// ────────────────────────────────────────────────────────────────────────────
// Context
// ────────────────────────────────────────────────────────────────────────────

/// Everything one strategy evaluation may look at. Built per run, never stored.
pub struct StrategyContext<'a> {
    pub script: &'a PlaylistScript,
    pub filter: &'a ClipFilter,
    pub as_of: DateTime<Utc>,
    pub corpus: &'a dyn ClipCorpus,
    pub provider: Option<&'a dyn ClipRankingProvider>,
}

impl<'a> StrategyContext<'a> {
    pub fn provider(&self) -> Result<&'a dyn ClipRankingProvider, CurationError> {
        self.provider.ok_or_else(|| {
            CurationError::ProviderUnavailable(format!(
                "{} requires the live-platform provider, which is not configured",
                self.script.strategy
            ))
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// A named curation algorithm. Implement this and register it to add a new
/// strategy without touching the engine or the scheduler.
#[async_trait]
pub trait CurationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKind, Arc<dyn CurationStrategy>>,
}

impl StrategyRegistry {
    /// Registry holding all 15 built-in strategies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(standard::Standard));
        registry.register(Arc::new(engagement::SleeperHits));
        registry.register(Arc::new(engagement::ViralVelocity));
        registry.register(Arc::new(engagement::CommunityFavorites));
        registry.register(Arc::new(engagement::DeepCuts));
        registry.register(Arc::new(engagement::Controversial));
        registry.register(Arc::new(creators::FreshFaces));
        registry.register(Arc::new(creators::RisingStars));
        registry.register(Arc::new(affinity::SimilarVibes));
        registry.register(Arc::new(affinity::CrossGameHits));
        registry.register(Arc::new(affinity::BingeWorthy));
        registry.register(Arc::new(twitch::TwitchTopGame));
        registry.register(Arc::new(twitch::TwitchTopBroadcaster));
        registry.register(Arc::new(twitch::TwitchTrending));
        registry.register(Arc::new(twitch::TwitchDiscovery));
        registry
    }

    /// Registers `strategy` under its own name, replacing any previous entry.
    pub fn register(&mut self, strategy: Arc<dyn CurationStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&Arc<dyn CurationStrategy>> {
        self.strategies.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Runs the script's strategy and enforces the result contract.
    pub async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let kind = ctx.script.strategy;
        let strategy = self
            .get(kind)
            .ok_or_else(|| CurationError::config(format!("unknown strategy: {kind}")))?;

        let ids = strategy.evaluate(ctx, limit).await?;
        Ok(finalize(ids, limit))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

/// De-duplicates while keeping first occurrences, then truncates to `limit`.
pub fn finalize(ids: impl IntoIterator<Item = Uuid>, limit: usize) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .take(limit)
        .collect()
}

/// Descending comparison of scores; NaN sorts last.
pub(crate) fn desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Delegates a scored ranking to the corpus.
pub(crate) async fn rank_local(
    ctx: &StrategyContext<'_>,
    ranking: LocalRanking,
    limit: usize,
) -> Result<Vec<Uuid>, CurationError> {
    ctx.corpus
        .rank_local(ctx.filter, ranking, limit)
        .await
        .map_err(CurationError::corpus)
}
