use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaylistRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub visibility: String,
    pub script_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaylistItemRow {
    pub playlist_id: Uuid,
    pub clip_id: Uuid,
    pub position: i32,
}

/// A playlist about to be written together with its ordered clips.
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub visibility: String,
    pub script_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub clip_ids: Vec<Uuid>,
}

impl NewPlaylist {
    /// Items with dense zero-based positions in clip order.
    pub fn items(&self) -> Vec<PlaylistItemRow> {
        self.clip_ids
            .iter()
            .enumerate()
            .map(|(position, clip_id)| PlaylistItemRow {
                playlist_id: self.id,
                clip_id: *clip_id,
                position: position as i32,
            })
            .collect()
    }
}
