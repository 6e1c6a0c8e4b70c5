//! Read models returned by the clip corpus and the external ranking provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-clip signals used by the local ranking strategies.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClipStats {
    pub id: Uuid,
    pub game_id: Option<String>,
    pub creator_id: Option<String>,
    pub view_count: i64,
    pub vote_score: i64,
    /// Number of votes cast, regardless of direction.
    pub vote_count: i64,
    pub comment_count: i64,
    pub favorite_count: i64,
    pub created_at: DateTime<Utc>,
    /// Fraction of plays watched to the end, 0.0 – 1.0.
    pub completion_rate: Option<f64>,
    /// Mean watch progress in seconds.
    pub avg_watch_progress: Option<f64>,
    /// Total published clips by the same creator.
    pub creator_clip_count: i64,
}

/// Nearest-neighbour hit from the embedding index.
#[derive(Debug, Clone, FromRow)]
pub struct Neighbor {
    pub id: Uuid,
    pub distance: f64,
}

/// Recent-window vs. historical engagement for one creator.
#[derive(Debug, Clone, FromRow)]
pub struct CreatorAggregate {
    pub creator_id: String,
    pub total_clips: i64,
    pub recent_clips: i64,
    pub baseline_avg: f64,
    pub recent_avg: f64,
}

/// A clip as reported by the live platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalClip {
    pub external_id: String,
    pub url: String,
    pub embed_url: String,
    pub title: String,
    pub broadcaster_id: String,
    pub broadcaster_name: String,
    pub creator_id: String,
    pub creator_name: String,
    pub game_id: String,
    pub language: String,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub thumbnail_url: String,
    pub duration: f64,
}

/// An external clip after it has been mapped into the local corpus.
#[derive(Debug, Clone, FromRow)]
pub struct ImportedClip {
    pub id: Uuid,
    pub external_id: String,
    pub is_nsfw: bool,
    pub tags: Vec<String>,
}
