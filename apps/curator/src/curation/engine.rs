//! Generation Engine: runs one script into at most one new playlist.
//!
//! Pipeline: take the script lock → re-read the script → resolve filters →
//! evaluate the strategy with `clip_limit` → (empty ⇒ stop) → render title →
//! write playlist and items atomically → record bookkeeping.
//!
//! Bookkeeping always advances `last_run_at`, success or failure, so a
//! broken script is retried only at its next natural due time.
//! `last_generated_playlist_id` moves only when a playlist was written.
//! Existing playlists are never modified.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::curation::corpus::ClipCorpus;
use crate::curation::error::CurationError;
use crate::curation::filter;
use crate::curation::provider::ClipRankingProvider;
use crate::curation::strategies::{StrategyContext, StrategyRegistry};
use crate::curation::title::render_title;
use crate::models::playlist::NewPlaylist;
use crate::models::script::PlaylistScript;
use crate::repository::{PlaylistStore, ScriptRepository};
use crate::scheduler::due;

/// Owner of generated playlists when the script has no creator.
pub const BOT_USER_ID: Uuid = Uuid::from_u128(1);

/// Version conflicts tolerated while recording a run.
const BOOKKEEPING_ATTEMPTS: usize = 3;

// ────────────────────────────────────────────────────────────────────────────
// Per-script locks
// ────────────────────────────────────────────────────────────────────────────

/// One async mutex per script id, shared by scheduled runs, manual triggers
/// and the retention sweeper. An entry lives only while some caller holds or
/// waits on it.
#[derive(Default)]
pub struct ScriptLocks {
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ScriptLocks {
    pub async fn acquire(self: &Arc<Self>, script_id: Uuid) -> ScriptGuard {
        let lock = self.entries().entry(script_id).or_default().clone();
        let guard = lock.lock_owned().await;
        ScriptGuard {
            guard: Some(guard),
            script_id,
            locks: Arc::clone(self),
        }
    }

    /// Scripts currently locked or awaited.
    #[cfg(test)]
    pub fn held(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Mutex<()>>>> {
        // The map stays consistent even if a holder panicked.
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, script_id: Uuid) {
        let mut entries = self.entries();
        if entries
            .get(&script_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            entries.remove(&script_id);
        }
    }
}

/// Held for the duration of one run or sweep of a script.
pub struct ScriptGuard {
    guard: Option<OwnedMutexGuard<()>>,
    script_id: Uuid,
    locks: Arc<ScriptLocks>,
}

impl Drop for ScriptGuard {
    fn drop(&mut self) {
        // Unlock first so the guard's own reference no longer counts.
        drop(self.guard.take());
        self.locks.release(self.script_id);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Generated { playlist_id: Uuid, clip_count: usize },
    /// The strategy found nothing; no playlist was written.
    Empty,
    /// A scheduled run found the script no longer due once it held the lock.
    NotDue,
}

#[derive(Clone)]
pub struct GenerationEngine {
    scripts: Arc<dyn ScriptRepository>,
    playlists: Arc<dyn PlaylistStore>,
    corpus: Arc<dyn ClipCorpus>,
    provider: Option<Arc<dyn ClipRankingProvider>>,
    registry: Arc<StrategyRegistry>,
    locks: Arc<ScriptLocks>,
}

impl GenerationEngine {
    pub fn new(
        scripts: Arc<dyn ScriptRepository>,
        playlists: Arc<dyn PlaylistStore>,
        corpus: Arc<dyn ClipCorpus>,
        provider: Option<Arc<dyn ClipRankingProvider>>,
        registry: StrategyRegistry,
    ) -> Self {
        Self {
            scripts,
            playlists,
            corpus,
            provider,
            registry: Arc::new(registry),
            locks: Arc::new(ScriptLocks::default()),
        }
    }

    pub fn locks(&self) -> Arc<ScriptLocks> {
        Arc::clone(&self.locks)
    }

    pub fn scripts(&self) -> &Arc<dyn ScriptRepository> {
        &self.scripts
    }

    pub fn playlists(&self) -> &Arc<dyn PlaylistStore> {
        &self.playlists
    }

    /// Called once at the start of every scheduler tick.
    pub fn begin_tick(&self) {
        if let Some(provider) = &self.provider {
            provider.reset_budget();
        }
    }

    /// Runs a script to completion under its lock.
    pub async fn run(
        &self,
        script_id: Uuid,
        trigger: RunTrigger,
        as_of: DateTime<Utc>,
    ) -> Result<RunOutcome, CurationError> {
        let _guard = self.locks.acquire(script_id).await;

        let script = self
            .scripts
            .get(script_id)
            .await
            .map_err(CurationError::persistence)?
            .ok_or(CurationError::ScriptNotFound(script_id))?;

        if !script.is_active {
            return Err(CurationError::ScriptInactive(script_id));
        }
        if trigger == RunTrigger::Scheduled && !due::is_due(&script, as_of) {
            debug!(script_id = %script_id, "Script no longer due, skipping");
            return Ok(RunOutcome::NotDue);
        }

        let result = self.generate(&script, as_of).await;
        let playlist_id = match &result {
            Ok(RunOutcome::Generated { playlist_id, .. }) => Some(*playlist_id),
            _ => None,
        };

        let recorded = self.record_run(script_id, as_of, playlist_id).await;

        match (result, recorded) {
            (Err(e), recorded) => {
                if let Err(bookkeeping) = recorded {
                    warn!(script_id = %script_id, error = %bookkeeping, "Failed to record failed run");
                }
                Err(e)
            }
            (Ok(_), Err(bookkeeping)) => Err(bookkeeping),
            (Ok(outcome), Ok(())) => Ok(outcome),
        }
    }

    /// Fire-and-forget manual run.
    pub fn trigger(&self, script_id: Uuid) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.run(script_id, RunTrigger::Manual, Utc::now()).await {
                Ok(outcome) => info!(script_id = %script_id, ?outcome, "Manual generation finished"),
                Err(e) => warn!(
                    script_id = %script_id,
                    kind = e.kind(),
                    error = %e,
                    "Manual generation failed"
                ),
            }
        })
    }

    async fn generate(
        &self,
        script: &PlaylistScript,
        as_of: DateTime<Utc>,
    ) -> Result<RunOutcome, CurationError> {
        let filter = filter::resolve(script)?;
        let ctx = StrategyContext {
            script,
            filter: &filter,
            as_of,
            corpus: self.corpus.as_ref(),
            provider: self.provider.as_deref(),
        };

        let limit = script.clip_limit.max(1) as usize;
        let clip_ids = self.registry.evaluate(&ctx, limit).await?;

        if clip_ids.is_empty() {
            info!(
                script_id = %script.id,
                strategy = %script.strategy,
                "Strategy returned no clips, no playlist created"
            );
            return Ok(RunOutcome::Empty);
        }

        let playlist = NewPlaylist {
            id: Uuid::new_v4(),
            user_id: script.created_by.unwrap_or(BOT_USER_ID),
            title: render_title(script.title_template.as_deref(), &script.name, as_of),
            description: script.description.clone(),
            visibility: script.visibility.as_str().to_string(),
            script_id: Some(script.id),
            created_at: as_of,
            clip_ids,
        };

        self.playlists
            .create_generated(&playlist)
            .await
            .map_err(CurationError::persistence)?;

        info!(
            script_id = %script.id,
            playlist_id = %playlist.id,
            strategy = %script.strategy,
            clips = playlist.clip_ids.len(),
            title = %playlist.title,
            "Generated playlist"
        );

        Ok(RunOutcome::Generated {
            playlist_id: playlist.id,
            clip_count: playlist.clip_ids.len(),
        })
    }

    /// Writes run bookkeeping, re-reading the script on version conflicts.
    async fn record_run(
        &self,
        script_id: Uuid,
        ran_at: DateTime<Utc>,
        playlist_id: Option<Uuid>,
    ) -> Result<(), CurationError> {
        for attempt in 1..=BOOKKEEPING_ATTEMPTS {
            let current = self
                .scripts
                .get(script_id)
                .await
                .map_err(CurationError::persistence)?
                .ok_or(CurationError::ScriptNotFound(script_id))?;

            let written = self
                .scripts
                .record_run(script_id, current.version, ran_at, playlist_id)
                .await
                .map_err(CurationError::persistence)?;
            if written {
                return Ok(());
            }
            debug!(script_id = %script_id, attempt, "Version conflict while recording run");
        }

        Err(CurationError::Persistence(format!(
            "could not record run for script {script_id} after {BOOKKEEPING_ATTEMPTS} version conflicts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::script::{Schedule, ScriptInput, StrategyKind, Visibility};
    use crate::testing::{clip, FakeProvider, MemoryCorpus, MemoryPlaylists, MemoryScripts};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn script(strategy: StrategyKind, schedule: Schedule) -> PlaylistScript {
        ScriptInput {
            name: Some("Top Valorant".to_string()),
            description: Some(Some("Best of the week".to_string())),
            strategy: Some(strategy),
            schedule: Some(schedule),
            visibility: Some(Visibility::Unlisted),
            clip_limit: Some(3),
            ..ScriptInput::default()
        }
        .into_script(None, Utc::now())
    }

    fn engine(
        scripts: Arc<dyn ScriptRepository>,
        playlists: Arc<MemoryPlaylists>,
        corpus: MemoryCorpus,
        provider: Option<FakeProvider>,
    ) -> GenerationEngine {
        GenerationEngine::new(
            scripts,
            playlists,
            Arc::new(corpus),
            provider.map(|p| Arc::new(p) as Arc<dyn ClipRankingProvider>),
            StrategyRegistry::with_defaults(),
        )
    }

    fn five_clips() -> MemoryCorpus {
        MemoryCorpus::default().with_clips((0..5).map(|i| clip().votes(i).build()).collect())
    }

    #[tokio::test]
    async fn test_generates_playlist_and_records_run() {
        let s = script(StrategyKind::Standard, Schedule::Daily);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        let engine = engine(scripts.clone(), playlists.clone(), five_clips(), None);
        let as_of = Utc::now();

        let outcome = engine.run(s.id, RunTrigger::Manual, as_of).await.unwrap();

        let generated = playlists.for_script(s.id);
        assert_eq!(generated.len(), 1);
        let playlist = &generated[0];
        assert_eq!(outcome, RunOutcome::Generated { playlist_id: playlist.id, clip_count: 3 });
        assert_eq!(playlist.clip_ids.len(), 3);
        assert_eq!(playlist.clip_ids.iter().collect::<HashSet<_>>().len(), 3);
        assert_eq!(playlist.user_id, BOT_USER_ID);
        assert_eq!(playlist.visibility, "unlisted");
        assert_eq!(playlist.description.as_deref(), Some("Best of the week"));
        assert!(playlist.title.starts_with("Top Valorant - "));

        let stored = scripts.snapshot(s.id).unwrap();
        assert_eq!(stored.last_run_at, Some(as_of));
        assert_eq!(stored.last_generated_playlist_id, Some(playlist.id));
    }

    #[tokio::test]
    async fn test_creator_owns_generated_playlist() {
        let mut s = script(StrategyKind::Standard, Schedule::Manual);
        let owner = Uuid::new_v4();
        s.created_by = Some(owner);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        let engine = engine(scripts, playlists.clone(), five_clips(), None);

        engine.run(s.id, RunTrigger::Manual, Utc::now()).await.unwrap();
        assert_eq!(playlists.for_script(s.id)[0].user_id, owner);
    }

    #[tokio::test]
    async fn test_empty_result_creates_nothing_but_advances_last_run() {
        let s = script(StrategyKind::Standard, Schedule::Daily);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        let engine = engine(scripts.clone(), playlists.clone(), MemoryCorpus::default(), None);
        let as_of = Utc::now();

        let outcome = engine.run(s.id, RunTrigger::Scheduled, as_of).await.unwrap();

        assert_eq!(outcome, RunOutcome::Empty);
        assert_eq!(playlists.len(), 0);
        let stored = scripts.snapshot(s.id).unwrap();
        assert_eq!(stored.last_run_at, Some(as_of));
        assert_eq!(stored.last_generated_playlist_id, None);
    }

    #[tokio::test]
    async fn test_failure_advances_last_run_and_keeps_previous_playlist_id() {
        let mut s = script(StrategyKind::TwitchTrending, Schedule::Hourly);
        let previous = Uuid::new_v4();
        s.last_generated_playlist_id = Some(previous);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        let engine = engine(scripts.clone(), playlists.clone(), MemoryCorpus::default(), None);
        let as_of = Utc::now();

        let err = engine.run(s.id, RunTrigger::Scheduled, as_of).await.unwrap_err();

        assert!(matches!(err, CurationError::ProviderUnavailable(_)));
        let stored = scripts.snapshot(s.id).unwrap();
        assert_eq!(stored.last_run_at, Some(as_of));
        assert_eq!(stored.last_generated_playlist_id, Some(previous));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported() {
        let s = script(StrategyKind::Standard, Schedule::Daily);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        playlists.set_failing(true);
        let engine = engine(scripts.clone(), playlists.clone(), five_clips(), None);

        let err = engine.run(s.id, RunTrigger::Manual, Utc::now()).await.unwrap_err();

        assert!(matches!(err, CurationError::Persistence(_)));
        let stored = scripts.snapshot(s.id).unwrap();
        assert!(stored.last_run_at.is_some());
        assert_eq!(stored.last_generated_playlist_id, None);
    }

    #[tokio::test]
    async fn test_configuration_error_surfaces() {
        let s = script(StrategyKind::SimilarVibes, Schedule::Manual);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let engine = engine(scripts, Arc::new(MemoryPlaylists::default()), five_clips(), None);

        let err = engine.run(s.id, RunTrigger::Manual, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CurationError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_inactive_and_missing_scripts_are_rejected() {
        let mut s = script(StrategyKind::Standard, Schedule::Daily);
        s.is_active = false;
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let engine = engine(scripts, Arc::new(MemoryPlaylists::default()), five_clips(), None);

        assert!(matches!(
            engine.run(s.id, RunTrigger::Manual, Utc::now()).await,
            Err(CurationError::ScriptInactive(_))
        ));
        assert!(matches!(
            engine.run(Uuid::new_v4(), RunTrigger::Manual, Utc::now()).await,
            Err(CurationError::ScriptNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduled_run_rechecks_due_after_lock() {
        let mut s = script(StrategyKind::Standard, Schedule::Daily);
        s.last_run_at = Some(Utc::now() - Duration::hours(2));
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        let engine = engine(scripts, playlists.clone(), five_clips(), None);

        let outcome = engine.run(s.id, RunTrigger::Scheduled, Utc::now()).await.unwrap();
        assert_eq!(outcome, RunOutcome::NotDue);
        assert_eq!(playlists.len(), 0);
    }

    #[tokio::test]
    async fn test_racing_runs_produce_one_playlist() {
        let s = script(StrategyKind::Standard, Schedule::Daily);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let playlists = Arc::new(MemoryPlaylists::default());
        let engine = engine(scripts, playlists.clone(), five_clips(), None);
        let as_of = Utc::now();

        let (a, b) = tokio::join!(
            engine.run(s.id, RunTrigger::Scheduled, as_of),
            engine.run(s.id, RunTrigger::Scheduled, as_of),
        );

        let outcomes = [a.unwrap(), b.unwrap()];
        assert!(outcomes.contains(&RunOutcome::NotDue));
        assert_eq!(playlists.len(), 1);
    }

    #[tokio::test]
    async fn test_begin_tick_resets_provider_budget() {
        let provider = Arc::new(FakeProvider::default());
        let engine = GenerationEngine::new(
            Arc::new(MemoryScripts::default()),
            Arc::new(MemoryPlaylists::default()),
            Arc::new(MemoryCorpus::default()),
            Some(provider.clone() as Arc<dyn ClipRankingProvider>),
            StrategyRegistry::with_defaults(),
        );
        engine.begin_tick();
        engine.begin_tick();
        assert_eq!(provider.resets(), 2);
    }

    /// Loses the first `conflicts` bookkeeping writes to a concurrent edit.
    struct ContendedScripts {
        inner: MemoryScripts,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl ScriptRepository for ContendedScripts {
        async fn list(&self) -> Result<Vec<PlaylistScript>> {
            self.inner.list().await
        }
        async fn get(&self, id: Uuid) -> Result<Option<PlaylistScript>> {
            self.inner.get(id).await
        }
        async fn create(&self, script: &PlaylistScript) -> Result<()> {
            self.inner.create(script).await
        }
        async fn update(&self, script: &PlaylistScript, expected: i64) -> Result<Option<PlaylistScript>> {
            self.inner.update(script, expected).await
        }
        async fn delete(&self, id: Uuid) -> Result<bool> {
            self.inner.delete(id).await
        }
        async fn list_active_scheduled(&self) -> Result<Vec<PlaylistScript>> {
            self.inner.list_active_scheduled().await
        }
        async fn record_run(
            &self,
            id: Uuid,
            expected: i64,
            ran_at: DateTime<Utc>,
            playlist_id: Option<Uuid>,
        ) -> Result<bool> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Ok(false);
            }
            self.inner.record_run(id, expected, ran_at, playlist_id).await
        }
    }

    #[tokio::test]
    async fn test_bookkeeping_retries_version_conflicts() {
        let s = script(StrategyKind::Standard, Schedule::Manual);
        let scripts = Arc::new(ContendedScripts {
            inner: MemoryScripts::with(vec![s.clone()]),
            conflicts: AtomicUsize::new(2),
        });
        let engine = engine(scripts.clone(), Arc::new(MemoryPlaylists::default()), five_clips(), None);

        engine.run(s.id, RunTrigger::Manual, Utc::now()).await.unwrap();
        assert!(scripts.inner.snapshot(s.id).unwrap().last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_bookkeeping_gives_up_after_repeated_conflicts() {
        let s = script(StrategyKind::Standard, Schedule::Manual);
        let scripts = Arc::new(ContendedScripts {
            inner: MemoryScripts::with(vec![s.clone()]),
            conflicts: AtomicUsize::new(10),
        });
        let engine = engine(scripts, Arc::new(MemoryPlaylists::default()), five_clips(), None);

        let err = engine.run(s.id, RunTrigger::Manual, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CurationError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_script_lock_entries_are_dropped_after_release() {
        let locks = Arc::new(ScriptLocks::default());
        for _ in 0..50 {
            let _guard = locks.acquire(Uuid::new_v4()).await;
            assert_eq!(locks.held(), 1);
        }
        assert_eq!(locks.held(), 0);
    }

    #[tokio::test]
    async fn test_script_lock_entry_survives_while_awaited() {
        let locks = Arc::new(ScriptLocks::default());
        let id = Uuid::new_v4();
        let first = locks.acquire(id).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        tokio::task::yield_now().await;
        drop(first);
        assert_eq!(locks.held(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.held(), 0);
    }

    #[tokio::test]
    async fn test_engine_releases_script_lock_after_run() {
        let s = script(StrategyKind::Standard, Schedule::Manual);
        let scripts = Arc::new(MemoryScripts::with(vec![s.clone()]));
        let engine = engine(scripts, Arc::new(MemoryPlaylists::default()), five_clips(), None);

        engine.run(s.id, RunTrigger::Manual, Utc::now()).await.unwrap();
        assert_eq!(engine.locks().held(), 0);
    }
}
