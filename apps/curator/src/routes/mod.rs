pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::curation::handlers;
use crate::scheduler::handlers::handle_scheduler_status;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Playlist scripts
        .route(
            "/api/v1/playlist-scripts",
            get(handlers::handle_list_scripts).post(handlers::handle_create_script),
        )
        .route(
            "/api/v1/playlist-scripts/:id",
            get(handlers::handle_get_script)
                .put(handlers::handle_update_script)
                .delete(handlers::handle_delete_script),
        )
        .route(
            "/api/v1/playlist-scripts/:id/generate",
            post(handlers::handle_generate),
        )
        .route(
            "/api/v1/playlist-scripts/:id/schedule",
            get(handlers::handle_get_schedule),
        )
        // Scheduler
        .route("/api/v1/scheduler/status", get(handle_scheduler_status))
        .with_state(state)
}
