//! External Clip Ranking Provider: the live platform's own top-clip rankings.
//!
//! Calls are rate limited by a per-tick [`RequestBudget`]. Throttling,
//! timeouts and an exhausted budget fail the calling run immediately; there is
//! no retry inside a tick.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::models::clip::ExternalClip;

/// Games at these ranks make up the mainstream tier skipped by discovery.
pub const MAINSTREAM_TIER: usize = 10;
/// Ranks fetched when looking for non-mainstream games (11–20).
pub const DISCOVERY_TIER: usize = 20;
/// Helix caps `first` at 100.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("throttled by provider")]
    Throttled,

    #[error("request budget exhausted for this tick")]
    BudgetExhausted,

    #[error("provider not configured")]
    NotConfigured,

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Errors that must end the whole run rather than just skip one query.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProviderError::Api { .. } | ProviderError::Decode(_))
    }
}

/// Half-open window `[started_at, ended_at)`. `None` windows mean all time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl TimeWindow {
    pub fn trailing(hours: i64, now: DateTime<Utc>) -> Self {
        Self {
            started_at: now - chrono::Duration::hours(hours),
            ended_at: now,
        }
    }
}

#[async_trait]
pub trait ClipRankingProvider: Send + Sync {
    async fn top_clips_for_game(
        &self,
        game_id: &str,
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError>;

    async fn top_clips_for_broadcaster(
        &self,
        broadcaster_id: &str,
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError>;

    /// Game ids in the platform's current popularity order.
    async fn top_game_ids(&self, first: usize) -> Result<Vec<String>, ProviderError>;

    /// Called by the scheduler at the start of every tick.
    fn reset_budget(&self) {}

    /// Top clips across the current mainstream games, most viewed first.
    async fn top_clips_across_trending_games(
        &self,
        window: TimeWindow,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        let games = self.top_game_ids(MAINSTREAM_TIER).await?;
        self.top_clips_for_games(&games, Some(window), first).await
    }

    /// Top clips from the games ranked just below the mainstream tier.
    async fn top_clips_from_non_mainstream_games(
        &self,
        window: TimeWindow,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        let games = self.top_game_ids(DISCOVERY_TIER).await?;
        let games = non_mainstream(games);
        self.top_clips_for_games(&games, Some(window), first).await
    }

    /// Spreads `first` across `game_ids`, rounding the per-game page up so the
    /// games together can fill `first`. A failing game is skipped unless the
    /// failure is fatal for the run.
    async fn top_clips_for_games(
        &self,
        game_ids: &[String],
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        if game_ids.is_empty() {
            return Ok(Vec::new());
        }
        let per_game = first.div_ceil(game_ids.len()).clamp(1, MAX_PAGE_SIZE);

        let mut all = Vec::new();
        for game_id in game_ids {
            if all.len() >= first {
                break;
            }
            match self.top_clips_for_game(game_id, window, per_game).await {
                Ok(clips) => all.extend(clips),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(game_id = %game_id, error = %e, "Skipping game after provider error"),
            }
        }

        all.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        Ok(all)
    }
}

/// Drops the mainstream tier when the ranking reaches past it.
pub fn non_mainstream(mut ranked_games: Vec<String>) -> Vec<String> {
    if ranked_games.len() > MAINSTREAM_TIER {
        ranked_games.split_off(MAINSTREAM_TIER)
    } else {
        ranked_games
    }
}

/// Per-tick request allowance shared by every run that uses the provider.
#[derive(Debug)]
pub struct RequestBudget {
    capacity: u32,
    remaining: AtomicU32,
}

impl RequestBudget {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            remaining: AtomicU32::new(capacity),
        }
    }

    pub fn try_acquire(&self) -> Result<(), ProviderError> {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| ProviderError::BudgetExhausted)
    }

    pub fn reset(&self) {
        self.remaining.store(self.capacity, Ordering::Release);
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}
