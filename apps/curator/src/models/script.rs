use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::UnknownVariant;

/// Inclusive bounds for `clip_limit`.
pub const MIN_CLIP_LIMIT: i32 = 1;
pub const MAX_CLIP_LIMIT: i32 = 100;

/// Inclusive bounds for `retention_days`.
pub const MIN_RETENTION_DAYS: i32 = 1;
pub const MAX_RETENTION_DAYS: i32 = 365;

pub const DEFAULT_RETENTION_DAYS: i32 = 30;

// ────────────────────────────────────────────────────────────────────────────
// Enumerations
// ────────────────────────────────────────────────────────────────────────────

/// The 15 curation strategies a script can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Standard,
    SleeperHits,
    ViralVelocity,
    CommunityFavorites,
    DeepCuts,
    FreshFaces,
    SimilarVibes,
    CrossGameHits,
    Controversial,
    BingeWorthy,
    RisingStars,
    TwitchTopGame,
    TwitchTopBroadcaster,
    TwitchTrending,
    TwitchDiscovery,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 15] = [
        StrategyKind::Standard,
        StrategyKind::SleeperHits,
        StrategyKind::ViralVelocity,
        StrategyKind::CommunityFavorites,
        StrategyKind::DeepCuts,
        StrategyKind::FreshFaces,
        StrategyKind::SimilarVibes,
        StrategyKind::CrossGameHits,
        StrategyKind::Controversial,
        StrategyKind::BingeWorthy,
        StrategyKind::RisingStars,
        StrategyKind::TwitchTopGame,
        StrategyKind::TwitchTopBroadcaster,
        StrategyKind::TwitchTrending,
        StrategyKind::TwitchDiscovery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Standard => "standard",
            StrategyKind::SleeperHits => "sleeper_hits",
            StrategyKind::ViralVelocity => "viral_velocity",
            StrategyKind::CommunityFavorites => "community_favorites",
            StrategyKind::DeepCuts => "deep_cuts",
            StrategyKind::FreshFaces => "fresh_faces",
            StrategyKind::SimilarVibes => "similar_vibes",
            StrategyKind::CrossGameHits => "cross_game_hits",
            StrategyKind::Controversial => "controversial",
            StrategyKind::BingeWorthy => "binge_worthy",
            StrategyKind::RisingStars => "rising_stars",
            StrategyKind::TwitchTopGame => "twitch_top_game",
            StrategyKind::TwitchTopBroadcaster => "twitch_top_broadcaster",
            StrategyKind::TwitchTrending => "twitch_trending",
            StrategyKind::TwitchDiscovery => "twitch_discovery",
        }
    }

    /// Strategies that consult the live-platform ranking provider.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            StrategyKind::TwitchTopGame
                | StrategyKind::TwitchTopBroadcaster
                | StrategyKind::TwitchTrending
                | StrategyKind::TwitchDiscovery
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("strategy", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Manual,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Schedule {
    pub fn as_str(self) -> &'static str {
        match self {
            Schedule::Manual => "manual",
            Schedule::Hourly => "hourly",
            Schedule::Daily => "daily",
            Schedule::Weekly => "weekly",
            Schedule::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Schedule {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Schedule::Manual),
            "hourly" => Ok(Schedule::Hourly),
            "daily" => Ok(Schedule::Daily),
            "weekly" => Ok(Schedule::Weekly),
            "monthly" => Ok(Schedule::Monthly),
            other => Err(UnknownVariant::new("schedule", other)),
        }
    }
}

/// Ordering used by the `standard` strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Top,
    Trending,
    Hot,
    Popular,
    New,
    Rising,
    Discussed,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Top => "top",
            SortOrder::Trending => "trending",
            SortOrder::Hot => "hot",
            SortOrder::Popular => "popular",
            SortOrder::New => "new",
            SortOrder::Rising => "rising",
            SortOrder::Discussed => "discussed",
        }
    }
}

impl FromStr for SortOrder {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(SortOrder::Top),
            "trending" => Ok(SortOrder::Trending),
            "hot" => Ok(SortOrder::Hot),
            "popular" => Ok(SortOrder::Popular),
            "new" => Ok(SortOrder::New),
            "rising" => Ok(SortOrder::Rising),
            "discussed" => Ok(SortOrder::Discussed),
            other => Err(UnknownVariant::new("sort", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Hour => "hour",
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Year => "year",
            Timeframe::All => "all",
        }
    }

    /// How far back the window reaches. `None` means all time.
    pub fn lookback(self) -> Option<Duration> {
        match self {
            Timeframe::Hour => Some(Duration::hours(1)),
            Timeframe::Day => Some(Duration::days(1)),
            Timeframe::Week => Some(Duration::days(7)),
            Timeframe::Month => Some(Duration::days(30)),
            Timeframe::Year => Some(Duration::days(365)),
            Timeframe::All => None,
        }
    }
}

impl FromStr for Timeframe {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Timeframe::Hour),
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "year" => Ok(Timeframe::Year),
            "all" => Ok(Timeframe::All),
            other => Err(UnknownVariant::new("timeframe", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "private" => Ok(Visibility::Private),
            other => Err(UnknownVariant::new("visibility", other)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Script
// ────────────────────────────────────────────────────────────────────────────

/// Declared filter fields of a script. Resolved into a `ClipFilter` before use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptFilters {
    pub game_id: Option<String>,
    #[serde(default)]
    pub game_ids: Vec<String>,
    pub broadcaster_id: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    pub language: Option<String>,
    pub min_vote_score: Option<i32>,
    pub min_view_count: Option<i64>,
    pub exclude_nsfw: bool,
    /// Restrict to broadcasters in the top-streamers table.
    pub top_tier_only: bool,
    pub seed_clip_id: Option<Uuid>,
}

/// A saved curation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistScript {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub strategy: StrategyKind,
    pub schedule: Schedule,
    pub sort: SortOrder,
    pub timeframe: Option<Timeframe>,
    pub clip_limit: i32,
    pub visibility: Visibility,
    pub is_active: bool,
    #[serde(flatten)]
    pub filters: ScriptFilters,
    pub retention_days: i32,
    pub title_template: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_generated_playlist_id: Option<Uuid>,
    /// Optimistic concurrency token. Every write bumps it.
    pub version: i64,
}

/// Raw `playlist_scripts` row. Enumerations are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct PlaylistScriptRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub strategy: String,
    pub schedule: String,
    pub sort: String,
    pub timeframe: Option<String>,
    pub clip_limit: i32,
    pub visibility: String,
    pub is_active: bool,
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
    pub seed_clip_id: Option<Uuid>,
    pub retention_days: i32,
    pub title_template: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_generated_playlist_id: Option<Uuid>,
    pub version: i64,
}

impl TryFrom<PlaylistScriptRow> for PlaylistScript {
    type Error = UnknownVariant;

    fn try_from(row: PlaylistScriptRow) -> Result<Self, Self::Error> {
        Ok(PlaylistScript {
            id: row.id,
            name: row.name,
            description: row.description,
            strategy: row.strategy.parse()?,
            schedule: row.schedule.parse()?,
            sort: row.sort.parse()?,
            timeframe: row.timeframe.as_deref().map(str::parse).transpose()?,
            clip_limit: row.clip_limit,
            visibility: row.visibility.parse()?,
            is_active: row.is_active,
            filters: ScriptFilters {
                game_id: row.game_id,
                game_ids: row.game_ids,
                broadcaster_id: row.broadcaster_id,
                tag: row.tag,
                exclude_tags: row.exclude_tags,
                language: row.language,
                min_vote_score: row.min_vote_score,
                min_view_count: row.min_view_count,
                exclude_nsfw: row.exclude_nsfw,
                top_tier_only: row.top_tier_only,
                seed_clip_id: row.seed_clip_id,
            },
            retention_days: row.retention_days,
            title_template: row.title_template,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_run_at: row.last_run_at,
            last_generated_playlist_id: row.last_generated_playlist_id,
            version: row.version,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operator input
// ────────────────────────────────────────────────────────────────────────────

/// Create/update payload from the admin surface. Absent fields keep their
/// current value on update and take the documented default on create. An
/// explicit `null` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptInput {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub strategy: Option<StrategyKind>,
    pub schedule: Option<Schedule>,
    pub sort: Option<SortOrder>,
    #[serde(default, deserialize_with = "nullable")]
    pub timeframe: Option<Option<Timeframe>>,
    pub clip_limit: Option<i32>,
    pub visibility: Option<Visibility>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub game_id: Option<Option<String>>,
    pub game_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub broadcaster_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tag: Option<Option<String>>,
    pub exclude_tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub language: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub min_vote_score: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub min_view_count: Option<Option<i64>>,
    pub exclude_nsfw: Option<bool>,
    pub top_tier_only: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub seed_clip_id: Option<Option<Uuid>>,
    pub retention_days: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub title_template: Option<Option<String>>,
    /// Required on update; the write is rejected if the stored version moved on.
    pub version: Option<i64>,
}

impl ScriptInput {
    /// Builds a new script. Defaults: standard/manual, public, active,
    /// NSFW excluded, 30-day retention, 25 clips.
    pub fn into_script(self, created_by: Option<Uuid>, now: DateTime<Utc>) -> PlaylistScript {
        let mut script = PlaylistScript {
            id: Uuid::new_v4(),
            name: String::new(),
            description: None,
            strategy: StrategyKind::Standard,
            schedule: Schedule::Manual,
            sort: SortOrder::Top,
            timeframe: None,
            clip_limit: 25,
            visibility: Visibility::Public,
            is_active: true,
            filters: ScriptFilters {
                exclude_nsfw: true,
                ..ScriptFilters::default()
            },
            retention_days: DEFAULT_RETENTION_DAYS,
            title_template: None,
            created_by,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            last_generated_playlist_id: None,
            version: 1,
        };
        self.apply_to(&mut script);
        script
    }

    /// Overwrites every field present in the payload. Bookkeeping fields are
    /// never touched here.
    pub fn apply_to(self, script: &mut PlaylistScript) {
        if let Some(name) = self.name {
            script.name = name;
        }
        if let Some(description) = self.description {
            script.description = description;
        }
        if let Some(strategy) = self.strategy {
            script.strategy = strategy;
        }
        if let Some(schedule) = self.schedule {
            script.schedule = schedule;
        }
        if let Some(sort) = self.sort {
            script.sort = sort;
        }
        if let Some(timeframe) = self.timeframe {
            script.timeframe = timeframe;
        }
        if let Some(limit) = self.clip_limit {
            script.clip_limit = limit;
        }
        if let Some(visibility) = self.visibility {
            script.visibility = visibility;
        }
        if let Some(active) = self.is_active {
            script.is_active = active;
        }

        let filters = &mut script.filters;
        if let Some(game_id) = self.game_id {
            filters.game_id = game_id;
        }
        if let Some(game_ids) = self.game_ids {
            filters.game_ids = game_ids;
        }
        if let Some(broadcaster_id) = self.broadcaster_id {
            filters.broadcaster_id = broadcaster_id;
        }
        if let Some(tag) = self.tag {
            filters.tag = tag;
        }
        if let Some(exclude_tags) = self.exclude_tags {
            filters.exclude_tags = exclude_tags;
        }
        if let Some(language) = self.language {
            filters.language = language;
        }
        if let Some(min_vote_score) = self.min_vote_score {
            filters.min_vote_score = min_vote_score;
        }
        if let Some(min_view_count) = self.min_view_count {
            filters.min_view_count = min_view_count;
        }
        if let Some(exclude_nsfw) = self.exclude_nsfw {
            filters.exclude_nsfw = exclude_nsfw;
        }
        if let Some(top_tier_only) = self.top_tier_only {
            filters.top_tier_only = top_tier_only;
        }
        if let Some(seed_clip_id) = self.seed_clip_id {
            filters.seed_clip_id = seed_clip_id;
        }

        if let Some(days) = self.retention_days {
            script.retention_days = days;
        }
        if let Some(title_template) = self.title_template {
            script.title_template = title_template;
        }
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field
/// (`None`, via `#[serde(default)]`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
