use std::sync::Arc;

use crate::config::Config;
use crate::curation::engine::GenerationEngine;
use crate::repository::ScriptRepository;
use crate::scheduler::StatusBoard;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub scripts: Arc<dyn ScriptRepository>,
    /// Manual triggers go through the same engine, and therefore the same
    /// per-script locks, as scheduled runs.
    pub engine: GenerationEngine,
    pub scheduler_status: Arc<StatusBoard>,
}
