use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::curation::filter::validate_for_save;
use crate::errors::AppError;
use crate::models::script::{PlaylistScript, Schedule, ScriptInput};
use crate::scheduler::due::next_due;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateScriptRequest {
    #[serde(flatten)]
    pub input: ScriptInput,
    pub created_by: Option<Uuid>,
}

#[derive(Serialize)]
pub struct GenerateAccepted {
    pub script_id: Uuid,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub script_id: Uuid,
    pub schedule: Schedule,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    /// `None` for manual and inactive scripts.
    pub next_due_at: Option<DateTime<Utc>>,
}

async fn load(state: &AppState, id: Uuid) -> Result<PlaylistScript, AppError> {
    state
        .scripts
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Playlist script {id} not found")))
}

/// GET /api/v1/playlist-scripts
pub async fn handle_list_scripts(
    State(state): State<AppState>,
) -> Result<Json<Vec<PlaylistScript>>, AppError> {
    Ok(Json(state.scripts.list().await?))
}

/// POST /api/v1/playlist-scripts
pub async fn handle_create_script(
    State(state): State<AppState>,
    Json(req): Json<CreateScriptRequest>,
) -> Result<(StatusCode, Json<PlaylistScript>), AppError> {
    let script = req.input.into_script(req.created_by, Utc::now());
    validate_for_save(&script)?;

    state.scripts.create(&script).await?;
    info!(script_id = %script.id, strategy = %script.strategy, "Created playlist script");
    Ok((StatusCode::CREATED, Json(script)))
}

/// GET /api/v1/playlist-scripts/:id
pub async fn handle_get_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlaylistScript>, AppError> {
    Ok(Json(load(&state, id).await?))
}

/// PUT /api/v1/playlist-scripts/:id
pub async fn handle_update_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScriptInput>,
) -> Result<Json<PlaylistScript>, AppError> {
    let expected_version = input
        .version
        .ok_or_else(|| AppError::Validation("version is required".to_string()))?;

    let mut script = load(&state, id).await?;
    if script.version != expected_version {
        return Err(AppError::Conflict(format!(
            "Playlist script {id} is at version {}, not {expected_version}",
            script.version
        )));
    }
    input.apply_to(&mut script);
    validate_for_save(&script)?;

    let updated = state
        .scripts
        .update(&script, expected_version)
        .await?
        .ok_or_else(|| AppError::Conflict(format!("Playlist script {id} was modified concurrently")))?;
    Ok(Json(updated))
}

/// DELETE /api/v1/playlist-scripts/:id
pub async fn handle_delete_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.scripts.delete(id).await? {
        return Err(AppError::NotFound(format!("Playlist script {id} not found")));
    }
    info!(script_id = %id, "Deleted playlist script");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/playlist-scripts/:id/generate
/// Accepted immediately; the run continues in the background.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<GenerateAccepted>), AppError> {
    let script = load(&state, id).await?;
    if !script.is_active {
        return Err(AppError::Conflict(format!("Playlist script {id} is inactive")));
    }

    state.engine.trigger(id);
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateAccepted {
            script_id: id,
            status: "accepted",
        }),
    ))
}

/// GET /api/v1/playlist-scripts/:id/schedule
pub async fn handle_get_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduleResponse>, AppError> {
    let script = load(&state, id).await?;
    let now = Utc::now();
    let next_due_at = script
        .is_active
        .then(|| next_due(script.schedule, script.last_run_at))
        .flatten()
        .map(|due| due.max(now));

    Ok(Json(ScheduleResponse {
        script_id: script.id,
        schedule: script.schedule,
        is_active: script.is_active,
        last_run_at: script.last_run_at,
        next_due_at,
    }))
}
