//! Filter Resolver: turns a script's declared filter fields into a validated
//! clip predicate.
//!
//! The predicate is the logical AND of every configured constraint. Removed
//! and hidden clips are always excluded by the corpus and are not modelled
//! here. Resolution is pure: the same script always yields the same filter or
//! the same `CurationError::Configuration`.

use crate::curation::error::CurationError;
use crate::models::clip::ImportedClip;
use crate::models::script::{
    PlaylistScript, ScriptFilters, StrategyKind, MAX_CLIP_LIMIT, MAX_RETENTION_DAYS,
    MIN_CLIP_LIMIT, MIN_RETENTION_DAYS,
};

/// Resolved clip predicate handed to corpus queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipFilter {
    pub game_id: Option<String>,
    pub game_ids: Vec<String>,
    pub broadcaster_id: Option<String>,
    pub tag: Option<String>,
    pub exclude_tags: Vec<String>,
    pub language: Option<String>,
    pub min_vote_score: Option<i32>,
    pub min_view_count: Option<i64>,
    pub exclude_nsfw: bool,
    pub top_tier_only: bool,
}

impl ClipFilter {
    /// Local exclusions applied to clips that arrive from the external
    /// provider, where the corpus predicate was never evaluated.
    pub fn admits_imported(&self, clip: &ImportedClip) -> bool {
        if self.exclude_nsfw && clip.is_nsfw {
            return false;
        }
        !clip
            .tags
            .iter()
            .any(|t| self.exclude_tags.iter().any(|x| x.eq_ignore_ascii_case(t)))
    }

    /// Language match for external clips. No configured language admits all.
    pub fn admits_language(&self, language: &str) -> bool {
        self.language
            .as_deref()
            .map_or(true, |wanted| wanted.eq_ignore_ascii_case(language))
    }
}

/// Resolves a script into its clip filter, enforcing bounds and the fields
/// each strategy structurally requires.
pub fn resolve(script: &PlaylistScript) -> Result<ClipFilter, CurationError> {
    check_bounds(script)?;

    let filter = normalize(&script.filters);
    check_required(script.strategy, &script.filters, &filter)?;

    Ok(filter)
}

/// Save-time validation: everything `resolve` checks plus a usable name.
pub fn validate_for_save(script: &PlaylistScript) -> Result<(), CurationError> {
    if script.name.trim().is_empty() {
        return Err(CurationError::config("name cannot be empty"));
    }
    resolve(script).map(|_| ())
}

fn check_bounds(script: &PlaylistScript) -> Result<(), CurationError> {
    if !(MIN_CLIP_LIMIT..=MAX_CLIP_LIMIT).contains(&script.clip_limit) {
        return Err(CurationError::config(format!(
            "clip_limit must be between {MIN_CLIP_LIMIT} and {MAX_CLIP_LIMIT}, got {}",
            script.clip_limit
        )));
    }
    if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&script.retention_days) {
        return Err(CurationError::config(format!(
            "retention_days must be between {MIN_RETENTION_DAYS} and {MAX_RETENTION_DAYS}, got {}",
            script.retention_days
        )));
    }
    Ok(())
}

fn check_required(
    strategy: StrategyKind,
    raw: &ScriptFilters,
    filter: &ClipFilter,
) -> Result<(), CurationError> {
    match strategy {
        StrategyKind::SimilarVibes if raw.seed_clip_id.is_none() => Err(CurationError::config(
            "similar_vibes strategy requires seed_clip_id",
        )),
        StrategyKind::CrossGameHits if filter.game_ids.is_empty() => Err(CurationError::config(
            "cross_game_hits strategy requires game_ids",
        )),
        StrategyKind::TwitchTopGame if filter.game_id.is_none() => Err(CurationError::config(
            "twitch_top_game strategy requires game_id",
        )),
        StrategyKind::TwitchTopBroadcaster if filter.broadcaster_id.is_none() => Err(
            CurationError::config("twitch_top_broadcaster strategy requires broadcaster_id"),
        ),
        _ => Ok(()),
    }
}

/// Trims text fields, drops blanks and de-duplicates id sets.
fn normalize(raw: &ScriptFilters) -> ClipFilter {
    ClipFilter {
        game_id: clean(raw.game_id.as_deref()),
        game_ids: clean_set(&raw.game_ids),
        broadcaster_id: clean(raw.broadcaster_id.as_deref()),
        tag: clean(raw.tag.as_deref()),
        exclude_tags: clean_set(&raw.exclude_tags),
        language: clean(raw.language.as_deref()),
        min_vote_score: raw.min_vote_score,
        min_view_count: raw.min_view_count,
        exclude_nsfw: raw.exclude_nsfw,
        top_tier_only: raw.top_tier_only,
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn clean_set(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if let Some(v) = clean(Some(value)) {
            if !out.contains(&v) {
                out.push(v);
            }
        }
    }
    out
}
