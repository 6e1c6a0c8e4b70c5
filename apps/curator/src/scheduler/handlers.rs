use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::scheduler::{RunState, TickReport};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SchedulerStatusResponse {
    pub enabled: bool,
    pub tick_minutes: u64,
    pub max_concurrent: usize,
    pub last_tick: Option<TickReport>,
    pub scripts: HashMap<Uuid, RunState>,
}

/// GET /api/v1/scheduler/status
pub async fn handle_scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatusResponse> {
    Json(SchedulerStatusResponse {
        enabled: state.config.scheduler_enabled,
        tick_minutes: state.config.scheduler_tick_minutes,
        max_concurrent: state.config.scheduler_max_concurrent,
        last_tick: state.scheduler_status.last_tick().await,
        scripts: state.scheduler_status.states().await,
    })
}
