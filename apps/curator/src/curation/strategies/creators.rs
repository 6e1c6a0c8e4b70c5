//! Creator-centred strategies: new voices and creators on an upswing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use super::{desc, rank_local, CurationStrategy, StrategyContext};
use crate::curation::corpus::LocalRanking;
use crate::curation::error::CurationError;
use crate::models::clip::{ClipStats, CreatorAggregate};
use crate::models::script::StrategyKind;

/// Creators with at most this many published clips count as new.
pub const FRESH_FACES_MAX_CLIPS: i64 = 5;

pub const RISING_WINDOW_DAYS: i64 = 30;
pub const RISING_MIN_TOTAL_CLIPS: i64 = 3;
/// Recent engagement must beat the creator's baseline by this factor.
pub const RISING_MIN_RATIO: f64 = 1.5;

// ────────────────────────────────────────────────────────────────────────────
// fresh_faces
// ────────────────────────────────────────────────────────────────────────────

/// Clips by creators with 1 to 5 published clips, best voted first.
pub struct FreshFaces;

#[async_trait]
impl CurationStrategy for FreshFaces {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FreshFaces
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        rank_local(ctx, LocalRanking::FreshFaces, limit).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// rising_stars
// ────────────────────────────────────────────────────────────────────────────

pub struct RisingStars;

#[async_trait]
impl CurationStrategy for RisingStars {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RisingStars
    }

    async fn evaluate(
        &self,
        ctx: &StrategyContext<'_>,
        limit: usize,
    ) -> Result<Vec<Uuid>, CurationError> {
        let recent_since = ctx.as_of - Duration::days(RISING_WINDOW_DAYS);

        let aggregates = ctx
            .corpus
            .creator_aggregates(ctx.filter, recent_since)
            .await
            .map_err(CurationError::corpus)?;
        let rising = rising_creators(&aggregates);
        if rising.is_empty() {
            return Ok(Vec::new());
        }

        // No creator can contribute more than `limit` clips.
        let recent = ctx
            .corpus
            .recent_clips_by_creators(ctx.filter, &rising, recent_since, limit)
            .await
            .map_err(CurationError::corpus)?;

        Ok(pick_rising_stars(&rising, &recent, limit))
    }
}

/// Creators whose recent average beats 1.5× their baseline. Ranked by
/// recent ÷ baseline with the baseline floored at 1, strongest rise first.
pub fn rising_creators(aggregates: &[CreatorAggregate]) -> Vec<String> {
    let mut rising: Vec<(&str, f64)> = aggregates
        .iter()
        .filter(|a| a.total_clips >= RISING_MIN_TOTAL_CLIPS && a.recent_clips >= 1)
        .filter(|a| a.recent_avg > a.baseline_avg * RISING_MIN_RATIO)
        .map(|a| (a.creator_id.as_str(), a.recent_avg / a.baseline_avg.max(1.0)))
        .collect();

    rising.sort_by(|a, b| desc(a.1, b.1).then_with(|| a.0.cmp(b.0)));
    rising.into_iter().map(|(id, _)| id.to_string()).collect()
}

/// Round-robin over `creators` in order, taking each one's next-best recent
/// clip per pass so a single creator cannot fill the playlist.
pub fn pick_rising_stars(creators: &[String], recent: &[ClipStats], limit: usize) -> Vec<Uuid> {
    let mut by_creator: HashMap<&str, Vec<&ClipStats>> = HashMap::new();
    for clip in recent {
        if let Some(creator) = clip.creator_id.as_deref() {
            by_creator.entry(creator).or_default().push(clip);
        }
    }
    let mut queues: Vec<std::vec::IntoIter<&ClipStats>> = creators
        .iter()
        .filter_map(|c| by_creator.remove(c.as_str()))
        .map(|mut clips| {
            clips.sort_by(|a, b| by_votes_then_views(a, b));
            clips.into_iter()
        })
        .collect();

    let mut picked = Vec::new();
    while picked.len() < limit {
        let before = picked.len();
        for queue in queues.iter_mut() {
            if picked.len() >= limit {
                break;
            }
            if let Some(clip) = queue.next() {
                picked.push(clip.id);
            }
        }
        if picked.len() == before {
            break;
        }
    }
    picked
}

fn by_votes_then_views(a: &ClipStats, b: &ClipStats) -> std::cmp::Ordering {
    b.vote_score
        .cmp(&a.vote_score)
        .then(b.view_count.cmp(&a.view_count))
}
