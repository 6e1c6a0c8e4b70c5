//! In-memory fakes shared by unit tests.

use std::cmp;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::curation::corpus::{ClipCorpus, LocalRanking};
use crate::curation::error::CurationError;
use crate::curation::filter::{self, ClipFilter};
use crate::curation::provider::{ClipRankingProvider, ProviderError, TimeWindow};
use crate::curation::strategies::affinity::{BINGE_MIN_CLIPS, SESSION_GAP_MINUTES};
use crate::curation::strategies::creators::FRESH_FACES_MAX_CLIPS;
use crate::curation::strategies::engagement::{
    CONTROVERSIAL_MIN_VIEWS, CONTROVERSIAL_MIN_VOTES, DEEP_CUTS_MIN_PROGRESS_SECS,
    DEEP_CUTS_PROGRESS_WEIGHT, DEEP_CUTS_VIEW_PERCENTILE, DEEP_CUTS_VOTE_WEIGHT,
    FAVORITES_MIN_VIEWS, SLEEPER_MAX_VIEWS, SLEEPER_MIN_COMPLETION, VIRAL_MIN_AGE_MINUTES,
    VIRAL_WINDOW_HOURS,
};
use crate::curation::strategies::{desc, CurationStrategy, StrategyContext};
use crate::models::clip::{ClipStats, CreatorAggregate, ExternalClip, ImportedClip, Neighbor};
use crate::models::playlist::NewPlaylist;
use crate::models::script::{PlaylistScript, ScriptInput, SortOrder, StrategyKind};
use crate::repository::{PlaylistStore, ScriptRepository};

// ────────────────────────────────────────────────────────────────────────────
// Clip builders
// ────────────────────────────────────────────────────────────────────────────

pub fn clip() -> ClipBuilder {
    ClipBuilder(ClipStats {
        id: Uuid::new_v4(),
        game_id: None,
        creator_id: None,
        view_count: 0,
        vote_score: 0,
        vote_count: 0,
        comment_count: 0,
        favorite_count: 0,
        created_at: Utc::now() - Duration::days(3),
        completion_rate: None,
        avg_watch_progress: None,
        creator_clip_count: 0,
    })
}

pub struct ClipBuilder(ClipStats);

impl ClipBuilder {
    pub fn views(mut self, n: i64) -> Self {
        self.0.view_count = n;
        self
    }
    pub fn votes(mut self, n: i64) -> Self {
        self.0.vote_score = n;
        self
    }
    pub fn vote_count(mut self, n: i64) -> Self {
        self.0.vote_count = n;
        self
    }
    pub fn comments(mut self, n: i64) -> Self {
        self.0.comment_count = n;
        self
    }
    pub fn favorites(mut self, n: i64) -> Self {
        self.0.favorite_count = n;
        self
    }
    pub fn completion(mut self, rate: f64) -> Self {
        self.0.completion_rate = Some(rate);
        self
    }
    pub fn progress(mut self, secs: f64) -> Self {
        self.0.avg_watch_progress = Some(secs);
        self
    }
    pub fn game(mut self, game_id: &str) -> Self {
        self.0.game_id = Some(game_id.to_string());
        self
    }
    pub fn creator(mut self, creator_id: &str, clip_count: i64) -> Self {
        self.0.creator_id = Some(creator_id.to_string());
        self.0.creator_clip_count = clip_count;
        self
    }
    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.0.created_at = at;
        self
    }
    pub fn age_hours(self, now: DateTime<Utc>, hours: f64) -> Self {
        self.created(now - Duration::seconds((hours * 3600.0) as i64))
    }
    pub fn build(self) -> ClipStats {
        self.0
    }
}

pub fn external(id: &str, game_id: &str, views: i64, language: &str) -> ExternalClip {
    ExternalClip {
        external_id: id.to_string(),
        url: format!("https://clips.twitch.tv/{id}"),
        embed_url: format!("https://clips.twitch.tv/embed?clip={id}"),
        title: format!("clip {id}"),
        broadcaster_id: "b1".to_string(),
        broadcaster_name: "streamer".to_string(),
        creator_id: "c1".to_string(),
        creator_name: "clipper".to_string(),
        game_id: game_id.to_string(),
        language: language.to_string(),
        view_count: views,
        created_at: Utc::now() - Duration::hours(2),
        thumbnail_url: String::new(),
        duration: 30.0,
    }
}

/// One play in a viewer's watch history.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub viewer_id: Uuid,
    pub clip_id: Uuid,
    pub watched_at: DateTime<Utc>,
    /// Whether the clip passes the script's filter. Ineligible plays still
    /// shape sessions but are never returned.
    pub eligible: bool,
}

pub fn watch(viewer_id: Uuid, clip_id: Uuid, at: DateTime<Utc>) -> WatchEvent {
    WatchEvent {
        viewer_id,
        clip_id,
        watched_at: at,
        eligible: true,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Strategy harness
// ────────────────────────────────────────────────────────────────────────────

/// An unfiltered script for `strategy` with the default clip limit.
pub fn local_script(strategy: StrategyKind) -> PlaylistScript {
    ScriptInput {
        name: Some("Local".to_string()),
        strategy: Some(strategy),
        ..ScriptInput::default()
    }
    .into_script(None, Utc::now())
}

/// Resolves `script` and evaluates `strategy` with its clip limit.
pub async fn evaluate(
    strategy: &dyn CurationStrategy,
    script: &PlaylistScript,
    corpus: &dyn ClipCorpus,
    as_of: DateTime<Utc>,
) -> Result<Vec<Uuid>, CurationError> {
    let filter = filter::resolve(script)?;
    let ctx = StrategyContext {
        script,
        filter: &filter,
        as_of,
        corpus,
        provider: None,
    };
    strategy.evaluate(&ctx, script.clip_limit as usize).await
}

// ────────────────────────────────────────────────────────────────────────────
// Corpus
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryCorpus {
    clips: Vec<ClipStats>,
    neighbors: Vec<Neighbor>,
    events: Vec<WatchEvent>,
    aggregates: Vec<CreatorAggregate>,
    nsfw_external: HashSet<String>,
    imported: Mutex<Vec<ImportedClip>>,
    failing: AtomicBool,
}

impl MemoryCorpus {
    pub fn with_clips(mut self, clips: Vec<ClipStats>) -> Self {
        self.clips = clips;
        self
    }
    pub fn with_neighbors(mut self, neighbors: Vec<Neighbor>) -> Self {
        self.neighbors = neighbors;
        self
    }
    pub fn with_events(mut self, events: Vec<WatchEvent>) -> Self {
        self.events = events;
        self
    }
    pub fn with_aggregates(mut self, aggregates: Vec<CreatorAggregate>) -> Self {
        self.aggregates = aggregates;
        self
    }
    pub fn with_nsfw_external(mut self, ids: &[&str]) -> Self {
        self.nsfw_external = ids.iter().map(|s| s.to_string()).collect();
        self
    }
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Local ids for previously imported external ids, in the given order.
    pub fn local_ids(&self, external_ids: &[&str]) -> Vec<Uuid> {
        let imported = self.imported.lock().unwrap();
        external_ids
            .iter()
            .filter_map(|e| imported.iter().find(|c| c.external_id == *e).map(|c| c.id))
            .collect()
    }

    pub fn imported_count(&self) -> usize {
        self.imported.lock().unwrap().len()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("corpus offline"));
        }
        Ok(())
    }

    fn matching<'a>(
        &'a self,
        filter: &'a ClipFilter,
        since: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &'a ClipStats> + 'a {
        self.clips
            .iter()
            .filter(move |c| since.map_or(true, |s| c.created_at >= s))
            .filter(move |c| {
                filter
                    .game_id
                    .as_ref()
                    .map_or(true, |g| c.game_id.as_ref() == Some(g))
            })
            .filter(move |c| {
                filter.game_ids.is_empty()
                    || c.game_id.as_ref().is_some_and(|g| filter.game_ids.contains(g))
            })
            .filter(move |c| filter.min_view_count.map_or(true, |m| c.view_count >= m))
    }
}

fn engagement(c: &ClipStats) -> f64 {
    (c.view_count + c.vote_score * 10 + c.comment_count * 5 + c.favorite_count * 3) as f64
}

fn per_view(n: i64, views: i64) -> f64 {
    n as f64 / views.max(1) as f64
}

/// Best score first, then `tie`, then id.
fn best(mut scored: Vec<(&ClipStats, f64)>, tie: fn(&ClipStats, &ClipStats) -> cmp::Ordering) -> Vec<Uuid> {
    scored.sort_by(|(a, sa), (b, sb)| {
        desc(*sa, *sb).then_with(|| tie(a, b)).then(a.id.cmp(&b.id))
    });
    scored.into_iter().map(|(c, _)| c.id).collect()
}

fn no_tie(_: &ClipStats, _: &ClipStats) -> cmp::Ordering {
    cmp::Ordering::Equal
}

/// In-process versions of the corpus rankings, over every matching clip.
impl MemoryCorpus {
    fn score(&self, filter: &ClipFilter, ranking: LocalRanking) -> Vec<Uuid> {
        let clips: Vec<&ClipStats> = self.matching(filter, None).collect();
        match ranking {
            LocalRanking::SleeperHits => best(
                clips
                    .into_iter()
                    .filter(|c| c.view_count <= SLEEPER_MAX_VIEWS)
                    .filter_map(|c| {
                        let completion = c.completion_rate?;
                        (completion >= SLEEPER_MIN_COMPLETION)
                            .then(|| (c, completion / c.view_count.max(1) as f64))
                    })
                    .collect(),
                |a, b| b.vote_score.cmp(&a.vote_score),
            ),
            LocalRanking::ViralVelocity { as_of } => {
                let start = as_of - Duration::hours(VIRAL_WINDOW_HOURS);
                let youngest = as_of - Duration::minutes(VIRAL_MIN_AGE_MINUTES);
                best(
                    clips
                        .into_iter()
                        .filter(|c| c.created_at > start && c.created_at <= youngest)
                        .map(|c| {
                            let hours = (as_of - c.created_at).num_seconds() as f64 / 3600.0;
                            (c, engagement(c) / hours)
                        })
                        .collect(),
                    no_tie,
                )
            }
            LocalRanking::CommunityFavorites => best(
                clips
                    .into_iter()
                    .filter(|c| c.view_count > FAVORITES_MIN_VIEWS && c.favorite_count > 0)
                    .map(|c| (c, per_view(c.favorite_count, c.view_count)))
                    .collect(),
                |a, b| b.favorite_count.cmp(&a.favorite_count),
            ),
            LocalRanking::DeepCuts => deep_cuts(&clips),
            LocalRanking::Controversial => best(
                clips
                    .into_iter()
                    .filter(|c| c.vote_count >= CONTROVERSIAL_MIN_VOTES)
                    .filter(|c| c.view_count > CONTROVERSIAL_MIN_VIEWS)
                    .map(|c| (c, per_view(c.comment_count, c.view_count)))
                    .collect(),
                |a, b| b.comment_count.cmp(&a.comment_count),
            ),
            LocalRanking::FreshFaces => best(
                clips
                    .into_iter()
                    .filter(|c| c.creator_id.is_some())
                    .filter(|c| (1..=FRESH_FACES_MAX_CLIPS).contains(&c.creator_clip_count))
                    .map(|c| (c, c.vote_score as f64))
                    .collect(),
                |a, b| b.view_count.cmp(&a.view_count),
            ),
            LocalRanking::CrossGameHits => cross_game(&clips),
            LocalRanking::BingeWorthy { since } => self.binges(since),
        }
    }

    fn binges(&self, since: DateTime<Utc>) -> Vec<Uuid> {
        let mut events: Vec<&WatchEvent> =
            self.events.iter().filter(|e| e.watched_at >= since).collect();
        events.sort_by(|a, b| {
            (a.viewer_id, a.watched_at, a.clip_id).cmp(&(b.viewer_id, b.watched_at, b.clip_id))
        });

        let gap = Duration::minutes(SESSION_GAP_MINUTES);
        let mut sessions: Vec<Vec<&WatchEvent>> = Vec::new();
        for event in events {
            let continues = sessions.last().and_then(|s| s.last()).is_some_and(|prev| {
                prev.viewer_id == event.viewer_id && event.watched_at - prev.watched_at <= gap
            });
            match sessions.last_mut() {
                Some(session) if continues => session.push(event),
                _ => {}
            }
            if !continues {
                sessions.push(vec![event]);
            }
        }

        // clip -> (binge sessions, earliest binge play)
        let mut binged: HashMap<Uuid, (i64, DateTime<Utc>)> = HashMap::new();
        for session in sessions {
            let distinct: HashSet<Uuid> = session.iter().map(|e| e.clip_id).collect();
            if (distinct.len() as i64) < BINGE_MIN_CLIPS {
                continue;
            }
            let mut counted = HashSet::new();
            for event in session.iter().filter(|e| e.eligible) {
                let entry = binged.entry(event.clip_id).or_insert((0, event.watched_at));
                if counted.insert(event.clip_id) {
                    entry.0 += 1;
                }
                entry.1 = entry.1.min(event.watched_at);
            }
        }

        let mut ranked: Vec<(Uuid, (i64, DateTime<Utc>))> = binged.into_iter().collect();
        ranked.sort_by(|(ia, (na, fa)), (ib, (nb, fb))| {
            nb.cmp(na).then(fa.cmp(fb)).then(ia.cmp(ib))
        });
        ranked.into_iter().map(|(id, _)| id).collect()
    }
}

fn deep_cuts(clips: &[&ClipStats]) -> Vec<Uuid> {
    let mut views: Vec<i64> = clips.iter().map(|c| c.view_count).collect();
    if views.is_empty() {
        return Vec::new();
    }
    views.sort_unstable();
    // Discrete percentile: first value whose cumulative share reaches p.
    let rank = (views.len() as f64 * DEEP_CUTS_VIEW_PERCENTILE).ceil() as usize;
    let ceiling = views[rank.clamp(1, views.len()) - 1];

    let eligible: Vec<(&ClipStats, f64)> = clips
        .iter()
        .copied()
        .filter(|c| c.view_count < ceiling && c.vote_score > 0)
        .filter_map(|c| {
            let progress = c.avg_watch_progress?;
            (progress >= DEEP_CUTS_MIN_PROGRESS_SECS).then_some((c, progress))
        })
        .collect();
    let max_progress = eligible.iter().map(|(_, p)| *p).fold(0.0_f64, f64::max);
    let max_votes = eligible.iter().map(|(c, _)| c.vote_score).max().unwrap_or(1).max(1);

    best(
        eligible
            .into_iter()
            .map(|(c, progress)| {
                let score = DEEP_CUTS_PROGRESS_WEIGHT * (progress / max_progress)
                    + DEEP_CUTS_VOTE_WEIGHT * per_view(c.vote_score, max_votes);
                (c, score)
            })
            .collect(),
        no_tie,
    )
}

fn cross_game(clips: &[&ClipStats]) -> Vec<Uuid> {
    let mut by_game: HashMap<&str, Vec<&ClipStats>> = HashMap::new();
    for &clip in clips {
        if let Some(game) = clip.game_id.as_deref() {
            by_game.entry(game).or_default().push(clip);
        }
    }

    let mut scored = Vec::new();
    for clips in by_game.values() {
        let (lo, hi) = clips.iter().map(|c| engagement(c)).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), e| (lo.min(e), hi.max(e)),
        );
        for clip in clips {
            let normalised = if hi > lo { (engagement(clip) - lo) / (hi - lo) } else { 1.0 };
            scored.push((*clip, normalised));
        }
    }
    best(scored, |a, b| b.view_count.cmp(&a.view_count))
}

#[async_trait]
impl ClipCorpus for MemoryCorpus {
    async fn ranked(
        &self,
        filter: &ClipFilter,
        _sort: SortOrder,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        self.check()?;
        let mut clips: Vec<&ClipStats> = self.matching(filter, since).collect();
        clips.sort_by(|a, b| {
            b.vote_score
                .cmp(&a.vote_score)
                .then(b.view_count.cmp(&a.view_count))
        });
        Ok(clips.into_iter().take(limit).map(|c| c.id).collect())
    }

    async fn rank_local(
        &self,
        filter: &ClipFilter,
        ranking: LocalRanking,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        self.check()?;
        let mut ids = self.score(filter, ranking);
        ids.truncate(limit);
        Ok(ids)
    }

    async fn recent_clips_by_creators(
        &self,
        filter: &ClipFilter,
        creators: &[String],
        since: DateTime<Utc>,
        per_creator: usize,
    ) -> Result<Vec<ClipStats>> {
        self.check()?;
        let mut by_creator: HashMap<&str, Vec<&ClipStats>> = HashMap::new();
        for clip in self.matching(filter, Some(since)) {
            if let Some(creator) = clip.creator_id.as_deref() {
                if creators.iter().any(|c| c == creator) {
                    by_creator.entry(creator).or_default().push(clip);
                }
            }
        }
        let mut out = Vec::new();
        for mut clips in by_creator.into_values() {
            clips.sort_by(|a, b| {
                b.vote_score
                    .cmp(&a.vote_score)
                    .then(b.view_count.cmp(&a.view_count))
                    .then(a.id.cmp(&b.id))
            });
            out.extend(clips.into_iter().take(per_creator).cloned());
        }
        Ok(out)
    }

    async fn nearest_neighbors(
        &self,
        _filter: &ClipFilter,
        _seed: Uuid,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        self.check()?;
        Ok(self.neighbors.iter().take(limit).cloned().collect())
    }

    async fn creator_aggregates(
        &self,
        _filter: &ClipFilter,
        _recent_since: DateTime<Utc>,
    ) -> Result<Vec<CreatorAggregate>> {
        self.check()?;
        Ok(self.aggregates.clone())
    }

    async fn import_external(&self, clips: &[ExternalClip]) -> Result<Vec<ImportedClip>> {
        self.check()?;
        let mut imported = self.imported.lock().unwrap();
        let mut out = Vec::with_capacity(clips.len());
        for clip in clips {
            let existing = imported
                .iter()
                .find(|c| c.external_id == clip.external_id)
                .cloned();
            let local = match existing {
                Some(c) => c,
                None => {
                    let c = ImportedClip {
                        id: Uuid::new_v4(),
                        external_id: clip.external_id.clone(),
                        is_nsfw: self.nsfw_external.contains(&clip.external_id),
                        tags: Vec::new(),
                    };
                    imported.push(c.clone());
                    c
                }
            };
            out.push(local);
        }
        Ok(out)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provider
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProviderCall {
    /// Game or broadcaster id.
    pub key: String,
    pub window: Option<TimeWindow>,
    pub first: usize,
}

#[derive(Default)]
pub struct FakeProvider {
    games: HashMap<String, Vec<ExternalClip>>,
    broadcasters: HashMap<String, Vec<ExternalClip>>,
    top_games: Vec<String>,
    broken_games: HashSet<String>,
    throttled: bool,
    calls: Mutex<Vec<ProviderCall>>,
    resets: AtomicUsize,
}

impl FakeProvider {
    pub fn with_game(mut self, game_id: &str, clips: Vec<ExternalClip>) -> Self {
        self.games.insert(game_id.to_string(), clips);
        self
    }
    pub fn with_broadcaster(mut self, broadcaster_id: &str, clips: Vec<ExternalClip>) -> Self {
        self.broadcasters.insert(broadcaster_id.to_string(), clips);
        self
    }
    pub fn with_top_games(mut self, game_ids: &[&str]) -> Self {
        self.top_games = game_ids.iter().map(|g| g.to_string()).collect();
        self
    }
    /// Requests for this game fail with a non-fatal API error.
    pub fn with_broken_game(mut self, game_id: &str) -> Self {
        self.broken_games.insert(game_id.to_string());
        self
    }
    /// Every request fails as throttled.
    pub fn throttled(mut self) -> Self {
        self.throttled = true;
        self
    }
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn record(&self, key: &str, window: Option<TimeWindow>, first: usize) {
        self.calls.lock().unwrap().push(ProviderCall {
            key: key.to_string(),
            window,
            first,
        });
    }
}

#[async_trait]
impl ClipRankingProvider for FakeProvider {
    async fn top_clips_for_game(
        &self,
        game_id: &str,
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        if self.throttled {
            return Err(ProviderError::Throttled);
        }
        self.record(game_id, window, first);
        if self.broken_games.contains(game_id) {
            return Err(ProviderError::Api {
                status: 500,
                message: "upstream error".to_string(),
            });
        }
        let mut clips = self.games.get(game_id).cloned().unwrap_or_default();
        clips.truncate(first);
        Ok(clips)
    }

    async fn top_clips_for_broadcaster(
        &self,
        broadcaster_id: &str,
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        if self.throttled {
            return Err(ProviderError::Throttled);
        }
        self.record(broadcaster_id, window, first);
        let mut clips = self.broadcasters.get(broadcaster_id).cloned().unwrap_or_default();
        clips.truncate(first);
        Ok(clips)
    }

    async fn top_game_ids(&self, first: usize) -> Result<Vec<String>, ProviderError> {
        if self.throttled {
            return Err(ProviderError::Throttled);
        }
        Ok(self.top_games.iter().take(first).cloned().collect())
    }

    fn reset_budget(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Repositories
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryScripts {
    scripts: Mutex<HashMap<Uuid, PlaylistScript>>,
}

impl MemoryScripts {
    pub fn with(scripts: Vec<PlaylistScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(|s| (s.id, s)).collect()),
        }
    }

    pub fn snapshot(&self, id: Uuid) -> Option<PlaylistScript> {
        self.scripts.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ScriptRepository for MemoryScripts {
    async fn list(&self) -> Result<Vec<PlaylistScript>> {
        let mut all: Vec<_> = self.scripts.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PlaylistScript>> {
        Ok(self.snapshot(id))
    }

    async fn create(&self, script: &PlaylistScript) -> Result<()> {
        self.scripts.lock().unwrap().insert(script.id, script.clone());
        Ok(())
    }

    async fn update(
        &self,
        script: &PlaylistScript,
        expected_version: i64,
    ) -> Result<Option<PlaylistScript>> {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(stored) = scripts.get_mut(&script.id) else {
            return Ok(None);
        };
        if stored.version != expected_version {
            return Ok(None);
        }
        let mut next = script.clone();
        next.created_by = stored.created_by;
        next.created_at = stored.created_at;
        next.last_run_at = stored.last_run_at;
        next.last_generated_playlist_id = stored.last_generated_playlist_id;
        next.updated_at = Utc::now();
        next.version = stored.version + 1;
        *stored = next.clone();
        Ok(Some(next))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.scripts.lock().unwrap().remove(&id).is_some())
    }

    async fn list_active_scheduled(&self) -> Result<Vec<PlaylistScript>> {
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active && s.schedule != crate::models::script::Schedule::Manual)
            .cloned()
            .collect())
    }

    async fn record_run(
        &self,
        id: Uuid,
        expected_version: i64,
        ran_at: DateTime<Utc>,
        playlist_id: Option<Uuid>,
    ) -> Result<bool> {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(stored) = scripts.get_mut(&id) else {
            return Ok(false);
        };
        if stored.version != expected_version {
            return Ok(false);
        }
        stored.last_run_at = Some(ran_at);
        if playlist_id.is_some() {
            stored.last_generated_playlist_id = playlist_id;
        }
        stored.version += 1;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemoryPlaylists {
    playlists: Mutex<Vec<NewPlaylist>>,
    failing: AtomicBool,
}

impl MemoryPlaylists {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, playlist: NewPlaylist) {
        self.playlists.lock().unwrap().push(playlist);
    }

    pub fn for_script(&self, script_id: Uuid) -> Vec<NewPlaylist> {
        self.playlists
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.script_id == Some(script_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.playlists.lock().unwrap().len()
    }
}

#[async_trait]
impl PlaylistStore for MemoryPlaylists {
    async fn create_generated(&self, playlist: &NewPlaylist) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        self.insert(playlist.clone());
        Ok(())
    }

    async fn delete_generated_before(&self, script_id: Uuid, cutoff: DateTime<Utc>) -> Result<u64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        let mut playlists = self.playlists.lock().unwrap();
        let before = playlists.len();
        playlists.retain(|p| !(p.script_id == Some(script_id) && p.created_at < cutoff));
        Ok((before - playlists.len()) as u64)
    }
}

/// A generated playlist for `script_id` created at `created_at`.
pub fn generated_playlist(script_id: Uuid, created_at: DateTime<Utc>) -> NewPlaylist {
    NewPlaylist {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        title: "old".to_string(),
        description: None,
        visibility: "public".to_string(),
        script_id: Some(script_id),
        created_at,
        clip_ids: vec![Uuid::new_v4()],
    }
}
