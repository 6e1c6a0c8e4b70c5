use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::PlaylistStore;
use crate::models::playlist::NewPlaylist;

pub struct PgPlaylistStore {
    pool: PgPool,
}

impl PgPlaylistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaylistStore for PgPlaylistStore {
    async fn create_generated(&self, playlist: &NewPlaylist) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO playlists (id, user_id, title, description, visibility, script_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(playlist.id)
        .bind(playlist.user_id)
        .bind(&playlist.title)
        .bind(&playlist.description)
        .bind(&playlist.visibility)
        .bind(playlist.script_id)
        .bind(playlist.created_at)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert playlist {}", playlist.id))?;

        let items = playlist.items();
        if !items.is_empty() {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO playlist_items (playlist_id, clip_id, position) ",
            );
            qb.push_values(&items, |mut row, item| {
                row.push_bind(item.playlist_id)
                    .push_bind(item.clip_id)
                    .push_bind(item.position);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert items for playlist {}", playlist.id))?;
        }

        tx.commit().await?;
        debug!(playlist_id = %playlist.id, items = items.len(), "Wrote generated playlist");
        Ok(())
    }

    async fn delete_generated_before(&self, script_id: Uuid, cutoff: DateTime<Utc>) -> Result<u64> {
        // playlist_items rows go with their playlist (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM playlists WHERE script_id = $1 AND created_at < $2")
            .bind(script_id)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to sweep playlists of script {script_id}"))?;
        Ok(result.rows_affected())
    }
}
