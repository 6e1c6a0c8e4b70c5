use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::ScriptRepository;
use crate::models::script::{PlaylistScript, PlaylistScriptRow};

pub struct PgScriptRepository {
    pool: PgPool,
}

impl PgScriptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: PlaylistScriptRow) -> Result<PlaylistScript> {
    let id = row.id;
    PlaylistScript::try_from(row).with_context(|| format!("Malformed playlist script {id}"))
}

fn decode_all(rows: Vec<PlaylistScriptRow>) -> Result<Vec<PlaylistScript>> {
    rows.into_iter().map(decode).collect()
}

#[async_trait]
impl ScriptRepository for PgScriptRepository {
    async fn list(&self) -> Result<Vec<PlaylistScript>> {
        let rows = sqlx::query_as::<_, PlaylistScriptRow>(
            "SELECT * FROM playlist_scripts ORDER BY created_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PlaylistScript>> {
        sqlx::query_as::<_, PlaylistScriptRow>("SELECT * FROM playlist_scripts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(decode)
            .transpose()
    }

    async fn create(&self, script: &PlaylistScript) -> Result<()> {
        let f = &script.filters;
        sqlx::query(
            r#"
            INSERT INTO playlist_scripts
                (id, name, description, strategy, schedule, sort, timeframe, clip_limit,
                 visibility, is_active, game_id, game_ids, broadcaster_id, tag, exclude_tags,
                 language, min_vote_score, min_view_count, exclude_nsfw, top_tier_only,
                 seed_clip_id, retention_days, title_template, created_by, created_at,
                 updated_at, last_run_at, last_generated_playlist_id, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            "#,
        )
        .bind(script.id)
        .bind(&script.name)
        .bind(&script.description)
        .bind(script.strategy.as_str())
        .bind(script.schedule.as_str())
        .bind(script.sort.as_str())
        .bind(script.timeframe.map(|t| t.as_str()))
        .bind(script.clip_limit)
        .bind(script.visibility.as_str())
        .bind(script.is_active)
        .bind(&f.game_id)
        .bind(&f.game_ids)
        .bind(&f.broadcaster_id)
        .bind(&f.tag)
        .bind(&f.exclude_tags)
        .bind(&f.language)
        .bind(f.min_vote_score)
        .bind(f.min_view_count)
        .bind(f.exclude_nsfw)
        .bind(f.top_tier_only)
        .bind(f.seed_clip_id)
        .bind(script.retention_days)
        .bind(&script.title_template)
        .bind(script.created_by)
        .bind(script.created_at)
        .bind(script.updated_at)
        .bind(script.last_run_at)
        .bind(script.last_generated_playlist_id)
        .bind(script.version)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert playlist script {}", script.id))?;
        Ok(())
    }

    async fn update(
        &self,
        script: &PlaylistScript,
        expected_version: i64,
    ) -> Result<Option<PlaylistScript>> {
        let f = &script.filters;
        sqlx::query_as::<_, PlaylistScriptRow>(
            r#"
            UPDATE playlist_scripts SET
                name = $3, description = $4, strategy = $5, schedule = $6, sort = $7,
                timeframe = $8, clip_limit = $9, visibility = $10, is_active = $11,
                game_id = $12, game_ids = $13, broadcaster_id = $14, tag = $15,
                exclude_tags = $16, language = $17, min_vote_score = $18,
                min_view_count = $19, exclude_nsfw = $20, top_tier_only = $21,
                seed_clip_id = $22, retention_days = $23, title_template = $24,
                updated_at = NOW(), version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(script.id)
        .bind(expected_version)
        .bind(&script.name)
        .bind(&script.description)
        .bind(script.strategy.as_str())
        .bind(script.schedule.as_str())
        .bind(script.sort.as_str())
        .bind(script.timeframe.map(|t| t.as_str()))
        .bind(script.clip_limit)
        .bind(script.visibility.as_str())
        .bind(script.is_active)
        .bind(&f.game_id)
        .bind(&f.game_ids)
        .bind(&f.broadcaster_id)
        .bind(&f.tag)
        .bind(&f.exclude_tags)
        .bind(&f.language)
        .bind(f.min_vote_score)
        .bind(f.min_view_count)
        .bind(f.exclude_nsfw)
        .bind(f.top_tier_only)
        .bind(f.seed_clip_id)
        .bind(script.retention_days)
        .bind(&script.title_template)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to update playlist script {}", script.id))?
        .map(decode)
        .transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playlist_scripts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_scheduled(&self) -> Result<Vec<PlaylistScript>> {
        let rows = sqlx::query_as::<_, PlaylistScriptRow>(
            r#"
            SELECT * FROM playlist_scripts
            WHERE is_active = true AND schedule <> 'manual'
            ORDER BY last_run_at ASC NULLS FIRST, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn record_run(
        &self,
        id: Uuid,
        expected_version: i64,
        ran_at: DateTime<Utc>,
        playlist_id: Option<Uuid>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE playlist_scripts SET
                last_run_at = $3,
                last_generated_playlist_id = COALESCE($4, last_generated_playlist_id),
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(ran_at)
        .bind(playlist_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record run for playlist script {id}"))?;
        Ok(result.rows_affected() == 1)
    }
}
