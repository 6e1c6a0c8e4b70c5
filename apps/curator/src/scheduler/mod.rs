//! Scheduler: a single coordinator loop that ticks on a fixed interval,
//! independent of any script's schedule.
//!
//! Each tick:
//! 1. reset the external provider's request budget;
//! 2. scan active non-manual scripts and select the due ones;
//! 3. run them on a bounded worker pool (`Semaphore` + `JoinSet`);
//! 4. run the retention sweeper once all generation has finished.
//!
//! Per-script state moves Idle → Due → Running → Completed | Failed and back
//! to Idle at the start of the next tick. A failed script is not retried
//! until its next natural due time because the engine always advances
//! `last_run_at`.

pub mod due;
pub mod handlers;
pub mod retention;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::curation::engine::{GenerationEngine, RunOutcome, RunTrigger};
use crate::curation::error::CurationError;
use crate::models::script::PlaylistScript;
use crate::scheduler::retention::{RetentionSweeper, SweepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Due,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRunReport {
    pub script_id: Uuid,
    pub name: String,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScriptRunReport {
    fn new(script: &PlaylistScript, result: Result<RunOutcome, CurationError>) -> Self {
        let (state, outcome, error_kind, error) = match result {
            Ok(RunOutcome::NotDue) => (RunState::Idle, Some(RunOutcome::NotDue), None, None),
            Ok(outcome) => (RunState::Completed, Some(outcome), None, None),
            Err(e) => (RunState::Failed, None, Some(e.kind()), Some(e.to_string())),
        };
        Self {
            script_id: script.id,
            name: script.name.clone(),
            state,
            outcome,
            error_kind,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: usize,
    pub runs: Vec<ScriptRunReport>,
    pub sweep: SweepReport,
}

impl TickReport {
    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|r| r.state == RunState::Failed).count()
    }
}

/// Latest tick report and per-script run state, read by the status endpoint.
#[derive(Default)]
pub struct StatusBoard {
    last_tick: RwLock<Option<TickReport>>,
    states: RwLock<HashMap<Uuid, RunState>>,
}

impl StatusBoard {
    pub async fn last_tick(&self) -> Option<TickReport> {
        self.last_tick.read().await.clone()
    }

    pub async fn states(&self) -> HashMap<Uuid, RunState> {
        self.states.read().await.clone()
    }

    async fn set(&self, script_id: Uuid, state: RunState) {
        self.states.write().await.insert(script_id, state);
    }

    /// Finished scripts return to Idle when a new tick starts.
    async fn settle(&self) {
        for state in self.states.write().await.values_mut() {
            if matches!(state, RunState::Completed | RunState::Failed) {
                *state = RunState::Idle;
            }
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    engine: GenerationEngine,
    sweeper: RetentionSweeper,
    tick_interval: Duration,
    max_concurrent: usize,
    status: Arc<StatusBoard>,
}

impl Scheduler {
    pub fn new(
        engine: GenerationEngine,
        tick_interval: Duration,
        max_concurrent: usize,
        status: Arc<StatusBoard>,
    ) -> Self {
        let sweeper = RetentionSweeper::for_engine(&engine);
        Self {
            engine,
            sweeper,
            tick_interval,
            max_concurrent: max_concurrent.max(1),
            status,
        }
    }

    /// Ticks until `cancel` fires. An in-flight tick finishes first.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            max_concurrent = self.max_concurrent,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick(Utc::now()).await;
                    if report.runs.is_empty() {
                        debug!(scanned = report.scanned, "Scheduler tick: nothing due");
                    } else {
                        info!(
                            scanned = report.scanned,
                            ran = report.runs.len(),
                            failed = report.failed(),
                            expired = report.sweep.playlists_deleted,
                            "Scheduler tick finished"
                        );
                    }
                }
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.engine.begin_tick();
        self.status.settle().await;

        let scripts = match self.engine.scripts().list_active_scheduled().await {
            Ok(scripts) => scripts,
            Err(e) => {
                error!(error = %e, "Scheduler could not list scripts");
                Vec::new()
            }
        };
        let due: Vec<PlaylistScript> = due::due_scripts(&scripts, now).into_iter().cloned().collect();

        for script in &due {
            self.status.set(script.id, RunState::Due).await;
        }

        let pool = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();
        for script in due {
            let engine = self.engine.clone();
            let pool = Arc::clone(&pool);
            let status = Arc::clone(&self.status);
            workers.spawn(async move {
                let _permit = pool.acquire_owned().await.ok();
                status.set(script.id, RunState::Running).await;

                let result = engine.run(script.id, RunTrigger::Scheduled, now).await;
                if let Err(e) = &result {
                    warn!(
                        script_id = %script.id,
                        strategy = %script.strategy,
                        kind = e.kind(),
                        error = %e,
                        "Scheduled generation failed"
                    );
                }

                let report = ScriptRunReport::new(&script, result);
                status.set(script.id, report.state).await;
                report
            });
        }

        let mut runs = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(report) => runs.push(report),
                Err(e) => error!(error = %e, "Generation worker panicked"),
            }
        }

        let sweep = self.sweeper.sweep(now).await;

        let report = TickReport {
            started_at: now,
            finished_at: Utc::now(),
            scanned: scripts.len(),
            runs,
            sweep,
        };
        *self.status.last_tick.write().await = Some(report.clone());
        report
    }
}
