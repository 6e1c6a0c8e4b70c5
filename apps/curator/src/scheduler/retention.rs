//! Retention Sweeper: deletes generated playlists older than their script's
//! retention window.
//!
//! Only playlists carrying the script's id are candidates, so user-created
//! playlists and other scripts' playlists are never touched. Scripts are swept
//! in parallel; a failure for one script is logged and does not stop the rest.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::curation::engine::{GenerationEngine, ScriptLocks};
use crate::models::script::PlaylistScript;
use crate::repository::{PlaylistStore, ScriptRepository};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub scripts_swept: usize,
    pub playlists_deleted: u64,
    pub failures: usize,
}

/// Playlists created strictly before this instant are expired.
pub fn retention_cutoff(script: &PlaylistScript, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(script.retention_days))
}

#[derive(Clone)]
pub struct RetentionSweeper {
    scripts: Arc<dyn ScriptRepository>,
    playlists: Arc<dyn PlaylistStore>,
    locks: Arc<ScriptLocks>,
}

impl RetentionSweeper {
    /// Shares the engine's repositories and per-script locks.
    pub fn for_engine(engine: &GenerationEngine) -> Self {
        Self {
            scripts: Arc::clone(engine.scripts()),
            playlists: Arc::clone(engine.playlists()),
            locks: engine.locks(),
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let scripts = match self.scripts.list().await {
            Ok(scripts) => scripts,
            Err(e) => {
                error!(error = %e, "Retention sweep could not list scripts");
                return SweepReport {
                    failures: 1,
                    ..SweepReport::default()
                };
            }
        };

        let mut tasks = JoinSet::new();
        for script in scripts {
            let playlists = Arc::clone(&self.playlists);
            let locks = Arc::clone(&self.locks);
            tasks.spawn(async move {
                let _guard = locks.acquire(script.id).await;
                let cutoff = retention_cutoff(&script, now);
                let result = playlists.delete_generated_before(script.id, cutoff).await;
                (script.id, result)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((script_id, Ok(deleted))) => {
                    report.scripts_swept += 1;
                    report.playlists_deleted += deleted;
                    if deleted > 0 {
                        debug!(script_id = %script_id, deleted, "Expired generated playlists");
                    }
                }
                Ok((script_id, Err(e))) => {
                    report.failures += 1;
                    error!(script_id = %script_id, error = %e, "Retention sweep failed for script");
                }
                Err(e) => {
                    report.failures += 1;
                    error!(error = %e, "Retention sweep task panicked");
                }
            }
        }

        if report.playlists_deleted > 0 || report.failures > 0 {
            info!(
                swept = report.scripts_swept,
                deleted = report.playlists_deleted,
                failures = report.failures,
                "Retention sweep finished"
            );
        }
        report
    }
}
