//! Persistence seams. The engine and scheduler only see these traits; the
//! Postgres implementations live in the submodules.

pub mod corpus;
pub mod playlists;
pub mod scripts;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::playlist::NewPlaylist;
use crate::models::script::PlaylistScript;

#[async_trait]
pub trait ScriptRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<PlaylistScript>>;

    async fn get(&self, id: Uuid) -> Result<Option<PlaylistScript>>;

    async fn create(&self, script: &PlaylistScript) -> Result<()>;

    /// Writes the editable fields of `script` if the stored version still
    /// equals `expected_version`, bumping the version. `None` on conflict or
    /// when the script no longer exists.
    async fn update(
        &self,
        script: &PlaylistScript,
        expected_version: i64,
    ) -> Result<Option<PlaylistScript>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Active scripts with a non-manual schedule.
    async fn list_active_scheduled(&self) -> Result<Vec<PlaylistScript>>;

    /// Records a generation attempt under the same version check as
    /// `update`. `playlist_id` is only written when present.
    async fn record_run(
        &self,
        id: Uuid,
        expected_version: i64,
        ran_at: DateTime<Utc>,
        playlist_id: Option<Uuid>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait PlaylistStore: Send + Sync {
    /// Writes the playlist and all of its items atomically.
    async fn create_generated(&self, playlist: &NewPlaylist) -> Result<()>;

    /// Deletes the script's generated playlists created before `cutoff`,
    /// returning how many were removed.
    async fn delete_generated_before(&self, script_id: Uuid, cutoff: DateTime<Utc>) -> Result<u64>;
}
