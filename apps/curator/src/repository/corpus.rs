//! Postgres-backed `ClipCorpus`.
//!
//! Reads the platform's shared clip tables (`clips`, `clip_tags`, `tags`,
//! `clip_analytics`, `votes`, `watch_history`, `top_streamers`). Only
//! `import_external` writes, and only to `clips`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::curation::corpus::{ClipCorpus, LocalRanking};
use crate::curation::filter::ClipFilter;
use crate::curation::strategies::affinity::{BINGE_MIN_CLIPS, SESSION_GAP_MINUTES};
use crate::curation::strategies::creators::FRESH_FACES_MAX_CLIPS;
use crate::curation::strategies::engagement::{
    CONTROVERSIAL_MIN_VIEWS, CONTROVERSIAL_MIN_VOTES, DEEP_CUTS_MIN_PROGRESS_SECS,
    DEEP_CUTS_PROGRESS_WEIGHT, DEEP_CUTS_VIEW_PERCENTILE, DEEP_CUTS_VOTE_WEIGHT,
    FAVORITES_MIN_VIEWS, SLEEPER_MAX_VIEWS, SLEEPER_MIN_COMPLETION, VIRAL_MIN_AGE_MINUTES,
    VIRAL_WINDOW_HOURS,
};
use crate::models::clip::{ClipStats, CreatorAggregate, ExternalClip, ImportedClip, Neighbor};
use crate::models::script::SortOrder;

/// Age of `c` in hours, as a float.
const AGE_HOURS: &str = "(EXTRACT(EPOCH FROM (NOW() - c.created_at)) / 3600.0)";

pub struct PgClipCorpus {
    pool: PgPool,
}

impl PgClipCorpus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Query fragments
// ────────────────────────────────────────────────────────────────────────────

/// Appends the filter predicate over alias `c`. The builder must already end
/// inside a `WHERE` clause.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ClipFilter) {
    qb.push("c.is_removed = false AND c.is_hidden = false");

    if filter.exclude_nsfw {
        qb.push(" AND c.is_nsfw = false");
    }
    if let Some(game_id) = &filter.game_id {
        qb.push(" AND c.game_id = ").push_bind(game_id.clone());
    }
    if !filter.game_ids.is_empty() {
        qb.push(" AND c.game_id = ANY(").push_bind(filter.game_ids.clone()).push(")");
    }
    if let Some(broadcaster_id) = &filter.broadcaster_id {
        qb.push(" AND c.broadcaster_id = ").push_bind(broadcaster_id.clone());
    }
    if let Some(tag) = &filter.tag {
        qb.push(
            " AND EXISTS (SELECT 1 FROM clip_tags ct JOIN tags t ON t.id = ct.tag_id \
             WHERE ct.clip_id = c.id AND t.slug = ",
        )
        .push_bind(tag.clone())
        .push(")");
    }
    if !filter.exclude_tags.is_empty() {
        qb.push(
            " AND NOT EXISTS (SELECT 1 FROM clip_tags ct JOIN tags t ON t.id = ct.tag_id \
             WHERE ct.clip_id = c.id AND t.slug = ANY(",
        )
        .push_bind(filter.exclude_tags.clone())
        .push("))");
    }
    if let Some(language) = &filter.language {
        qb.push(" AND c.language = ").push_bind(language.clone());
    }
    if let Some(min) = filter.min_vote_score {
        qb.push(" AND c.vote_score >= ").push_bind(min);
    }
    if let Some(min) = filter.min_view_count {
        qb.push(" AND c.view_count >= ").push_bind(min);
    }
    if filter.top_tier_only {
        qb.push(" AND c.broadcaster_id IN (SELECT broadcaster_id FROM top_streamers)");
    }
}

fn push_since(qb: &mut QueryBuilder<'_, Postgres>, since: Option<DateTime<Utc>>) {
    if let Some(since) = since {
        qb.push(" AND c.created_at >= ").push_bind(since);
    }
}

/// Engagement weight shared by `popular` and `trending`.
const POPULARITY: &str =
    "(c.view_count + c.vote_score * 2 + c.comment_count * 3 + c.favorite_count * 2)";

/// Leading `ORDER BY` key for a sort. Every sort is tie-broken by recency
/// then id so pages are deterministic.
fn sort_key(sort: SortOrder) -> String {
    match sort {
        SortOrder::Top => "c.vote_score DESC".to_string(),
        SortOrder::New => "c.created_at DESC".to_string(),
        SortOrder::Discussed => "c.comment_count DESC".to_string(),
        SortOrder::Popular => format!("{POPULARITY} DESC"),
        SortOrder::Trending => {
            format!("({POPULARITY}::float8 / GREATEST({AGE_HOURS}, 1.0)) DESC")
        }
        SortOrder::Hot => format!("(c.vote_score::float8 / POWER({AGE_HOURS} + 2.0, 1.5)) DESC"),
        SortOrder::Rising => format!(
            "((c.vote_score + c.view_count / 100.0) * (1.0 + 1.0 / ({AGE_HOURS} + 2.0))) DESC"
        ),
    }
}

fn to_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Opens a `stats` CTE holding one `ClipStats` row per filtered clip. The
/// builder is left inside the CTE's `WHERE`; callers close it with `)`.
fn stats_cte(filter: &ClipFilter, since: Option<DateTime<Utc>>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(
        r#"
        WITH stats AS (
            SELECT c.id, c.game_id, c.creator_id,
                   c.view_count::int8 AS view_count,
                   c.vote_score::int8 AS vote_score,
                   COALESCE(v.vote_count, 0) AS vote_count,
                   c.comment_count::int8 AS comment_count,
                   c.favorite_count::int8 AS favorite_count,
                   c.created_at,
                   ca.retention_rate::float8 AS completion_rate,
                   wh.avg_progress AS avg_watch_progress,
                   COALESCE(cc.clip_count, 0) AS creator_clip_count
            FROM clips c
            LEFT JOIN clip_analytics ca ON ca.clip_id = c.id
            LEFT JOIN (
                SELECT clip_id, COUNT(*)::int8 AS vote_count
                FROM votes
                GROUP BY clip_id
            ) v ON v.clip_id = c.id
            LEFT JOIN (
                SELECT clip_id, AVG(progress_seconds)::float8 AS avg_progress
                FROM watch_history
                GROUP BY clip_id
            ) wh ON wh.clip_id = c.id
            LEFT JOIN (
                SELECT creator_id, COUNT(*)::int8 AS clip_count
                FROM clips
                WHERE is_removed = false AND creator_id IS NOT NULL
                GROUP BY creator_id
            ) cc ON cc.creator_id = c.creator_id
            WHERE "#,
    );
    push_filter(&mut qb, filter);
    push_since(&mut qb, since);
    qb
}

/// Weighted engagement over a `stats` row aliased `s`.
const ENGAGEMENT: &str =
    "(s.view_count + s.vote_score * 10 + s.comment_count * 5 + s.favorite_count * 3)";

/// One statement per ranking: admission in `WHERE`, score in `ORDER BY`,
/// then `LIMIT`. Ties fall back to id.
fn local_ranking_query(
    filter: &ClipFilter,
    ranking: LocalRanking,
    limit: usize,
) -> QueryBuilder<'static, Postgres> {
    let scored = |since| {
        let mut qb = stats_cte(filter, since);
        qb.push(")");
        qb
    };

    let mut qb = match ranking {
        LocalRanking::BingeWorthy { since } => return binge_query(filter, since, limit),
        LocalRanking::SleeperHits => {
            let mut qb = scored(None);
            qb.push(" SELECT s.id FROM stats s WHERE s.view_count <= ")
                .push_bind(SLEEPER_MAX_VIEWS)
                .push(" AND s.completion_rate >= ")
                .push_bind(SLEEPER_MIN_COMPLETION)
                .push(
                    " ORDER BY s.completion_rate / GREATEST(s.view_count, 1)::float8 DESC, \
                     s.vote_score DESC",
                );
            qb
        }
        LocalRanking::ViralVelocity { as_of } => {
            let window_start = as_of - Duration::hours(VIRAL_WINDOW_HOURS);
            let mut qb = scored(Some(window_start));
            qb.push(" SELECT s.id FROM stats s WHERE s.created_at > ")
                .push_bind(window_start)
                .push(" AND s.created_at <= ")
                .push_bind(as_of - Duration::minutes(VIRAL_MIN_AGE_MINUTES))
                .push(format!(" ORDER BY {ENGAGEMENT}::float8 / (EXTRACT(EPOCH FROM ("))
                .push_bind(as_of)
                .push("::timestamptz - s.created_at)) / 3600.0) DESC");
            qb
        }
        LocalRanking::CommunityFavorites => {
            let mut qb = scored(None);
            qb.push(" SELECT s.id FROM stats s WHERE s.view_count > ")
                .push_bind(FAVORITES_MIN_VIEWS)
                .push(
                    " AND s.favorite_count > 0 \
                     ORDER BY s.favorite_count::float8 / GREATEST(s.view_count, 1) DESC, \
                     s.favorite_count DESC",
                );
            qb
        }
        LocalRanking::DeepCuts => {
            let mut qb = scored(None);
            qb.push(", ceiling AS (SELECT percentile_disc(")
                .push_bind(DEEP_CUTS_VIEW_PERCENTILE)
                .push(
                    ") WITHIN GROUP (ORDER BY view_count) AS views FROM stats), \
                     eligible AS (SELECT st.* FROM stats st, ceiling \
                     WHERE st.view_count < ceiling.views AND st.vote_score > 0 \
                     AND st.avg_watch_progress >= ",
                )
                .push_bind(DEEP_CUTS_MIN_PROGRESS_SECS)
                .push(
                    ") SELECT s.id FROM eligible s, \
                     (SELECT MAX(avg_watch_progress) AS max_progress, \
                             GREATEST(MAX(vote_score), 1) AS max_votes FROM eligible) m \
                     ORDER BY ",
                )
                .push_bind(DEEP_CUTS_PROGRESS_WEIGHT)
                .push(" * (s.avg_watch_progress / m.max_progress) + ")
                .push_bind(DEEP_CUTS_VOTE_WEIGHT)
                .push(" * (s.vote_score::float8 / m.max_votes) DESC");
            qb
        }
        LocalRanking::Controversial => {
            let mut qb = scored(None);
            qb.push(" SELECT s.id FROM stats s WHERE s.vote_count >= ")
                .push_bind(CONTROVERSIAL_MIN_VOTES)
                .push(" AND s.view_count > ")
                .push_bind(CONTROVERSIAL_MIN_VIEWS)
                .push(
                    " ORDER BY s.comment_count::float8 / GREATEST(s.view_count, 1) DESC, \
                     s.comment_count DESC",
                );
            qb
        }
        LocalRanking::FreshFaces => {
            let mut qb = scored(None);
            qb.push(
                " SELECT s.id FROM stats s WHERE s.creator_id IS NOT NULL \
                 AND s.creator_clip_count BETWEEN 1 AND ",
            )
            .push_bind(FRESH_FACES_MAX_CLIPS)
            .push(" ORDER BY s.vote_score DESC, s.view_count DESC");
            qb
        }
        LocalRanking::CrossGameHits => {
            let mut qb = scored(None);
            qb.push(format!(
                ", scored AS (SELECT s.id, s.view_count, {ENGAGEMENT} AS engagement, \
                 MIN({ENGAGEMENT}) OVER game AS lo, MAX({ENGAGEMENT}) OVER game AS hi \
                 FROM stats s WHERE s.game_id IS NOT NULL \
                 WINDOW game AS (PARTITION BY s.game_id)) \
                 SELECT s.id FROM scored s ORDER BY \
                 CASE WHEN s.hi > s.lo THEN (s.engagement - s.lo)::float8 / (s.hi - s.lo) \
                 ELSE 1.0 END DESC, s.view_count DESC"
            ));
            qb
        }
    };

    qb.push(", s.id LIMIT ").push_bind(to_limit(limit));
    qb
}

/// Splits each viewer's plays into sessions at gaps over the session gap,
/// keeps sessions with enough distinct clips, and ranks filtered clips by
/// the number of such sessions they appear in, then by earliest binge play.
/// Plays of filtered-out clips still shape sessions.
fn binge_query(filter: &ClipFilter, since: DateTime<Utc>, limit: usize) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(
        r#"
        WITH plays AS (
            SELECT wh.user_id, wh.clip_id, wh.watched_at,
                   CASE WHEN wh.watched_at - LAG(wh.watched_at) OVER viewer
                             <= make_interval(mins => "#,
    );
    qb.push_bind(SESSION_GAP_MINUTES)
        .push(
            r#"::int4)
                        THEN 0 ELSE 1 END AS starts_session
            FROM watch_history wh
            WHERE wh.watched_at >= "#,
        )
        .push_bind(since)
        .push(
            r#"
            WINDOW viewer AS (PARTITION BY wh.user_id ORDER BY wh.watched_at, wh.clip_id)
        ),
        sessions AS (
            SELECT user_id, clip_id, watched_at,
                   SUM(starts_session) OVER (
                       PARTITION BY user_id ORDER BY watched_at, clip_id
                       ROWS UNBOUNDED PRECEDING
                   ) AS session_no
            FROM plays
        ),
        binges AS (
            SELECT user_id, session_no
            FROM sessions
            GROUP BY user_id, session_no
            HAVING COUNT(DISTINCT clip_id) >= "#,
        )
        .push_bind(BINGE_MIN_CLIPS)
        .push(
            r#"
        ),
        binge_plays AS (
            SELECT s.clip_id, s.user_id, s.session_no, MIN(s.watched_at) AS first_seen
            FROM sessions s
            JOIN binges b USING (user_id, session_no)
            GROUP BY s.clip_id, s.user_id, s.session_no
        ),
        binged AS (
            SELECT clip_id, COUNT(*) AS sessions, MIN(first_seen) AS first_seen
            FROM binge_plays
            GROUP BY clip_id
        )
        SELECT c.id
        FROM binged b
        JOIN clips c ON c.id = b.clip_id
        WHERE "#,
        );
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY b.sessions DESC, b.first_seen, c.id LIMIT ")
        .push_bind(to_limit(limit));
    qb
}

/// Up to `per_creator` recent clips for each listed creator.
fn recent_by_creators_query(
    filter: &ClipFilter,
    creators: &[String],
    since: DateTime<Utc>,
    per_creator: usize,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = stats_cte(filter, Some(since));
    qb.push(" AND c.creator_id = ANY(")
        .push_bind(creators.to_vec())
        .push(
            ")) SELECT * FROM (\
             SELECT s.*, ROW_NUMBER() OVER (\
             PARTITION BY s.creator_id ORDER BY s.vote_score DESC, s.view_count DESC, s.id\
             ) AS pick FROM stats s) r WHERE r.pick <= ",
        )
        .push_bind(to_limit(per_creator))
        .push(" ORDER BY r.creator_id, r.pick");
    qb
}

// ────────────────────────────────────────────────────────────────────────────
// ClipCorpus
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ClipCorpus for PgClipCorpus {
    async fn ranked(
        &self,
        filter: &ClipFilter,
        sort: SortOrder,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT c.id FROM clips c WHERE ");
        push_filter(&mut qb, filter);
        push_since(&mut qb, since);
        qb.push(" ORDER BY ")
            .push(sort_key(sort))
            .push(", c.created_at DESC, c.id DESC LIMIT ")
            .push_bind(to_limit(limit));

        qb.build_query_scalar::<Uuid>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Ranked clip query failed (sort {})", sort.as_str()))
    }

    async fn rank_local(
        &self,
        filter: &ClipFilter,
        ranking: LocalRanking,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        let mut qb = local_ranking_query(filter, ranking, limit);
        let ids = qb
            .build_query_scalar::<Uuid>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Local ranking query failed ({ranking:?})"))?;
        debug!(?ranking, rows = ids.len(), "Ranked local clips");
        Ok(ids)
    }

    async fn recent_clips_by_creators(
        &self,
        filter: &ClipFilter,
        creators: &[String],
        since: DateTime<Utc>,
        per_creator: usize,
    ) -> Result<Vec<ClipStats>> {
        if creators.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = recent_by_creators_query(filter, creators, since, per_creator);
        qb.build_query_as::<ClipStats>()
            .fetch_all(&self.pool)
            .await
            .context("Recent creator clip query failed")
    }

    async fn nearest_neighbors(
        &self,
        filter: &ClipFilter,
        seed: Uuid,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT c.id, (c.embedding <=> seed.embedding)::float8 AS distance \
             FROM clips c, (SELECT embedding FROM clips WHERE id = ",
        );
        qb.push_bind(seed)
            .push(" AND embedding IS NOT NULL) seed WHERE c.embedding IS NOT NULL AND ");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY c.embedding <=> seed.embedding ASC, c.id LIMIT ")
            .push_bind(to_limit(limit));

        qb.build_query_as::<Neighbor>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Nearest-neighbour query failed for seed {seed}"))
    }

    async fn creator_aggregates(
        &self,
        filter: &ClipFilter,
        recent_since: DateTime<Utc>,
    ) -> Result<Vec<CreatorAggregate>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT c.creator_id, \
                    COUNT(*)::int8 AS total_clips, \
                    COUNT(*) FILTER (WHERE c.created_at >= ",
        );
        qb.push_bind(recent_since)
            .push(
                ")::int8 AS recent_clips, \
                 AVG(c.vote_score)::float8 AS baseline_avg, \
                 COALESCE(AVG(c.vote_score) FILTER (WHERE c.created_at >= ",
            )
            .push_bind(recent_since)
            .push(
                "), 0)::float8 AS recent_avg \
                 FROM clips c WHERE c.creator_id IS NOT NULL AND ",
            );
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY c.creator_id ORDER BY c.creator_id");

        qb.build_query_as::<CreatorAggregate>()
            .fetch_all(&self.pool)
            .await
            .context("Creator aggregate query failed")
    }

    async fn import_external(&self, clips: &[ExternalClip]) -> Result<Vec<ImportedClip>> {
        let mut imported = Vec::with_capacity(clips.len());

        for clip in clips {
            let row = sqlx::query_as::<_, ImportedClip>(
                r#"
                WITH upserted AS (
                    INSERT INTO clips
                        (id, twitch_clip_id, twitch_clip_url, embed_url, title,
                         creator_name, creator_id, broadcaster_name, broadcaster_id,
                         game_id, language, thumbnail_url, duration,
                         view_count, created_at, imported_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
                    ON CONFLICT (twitch_clip_id) DO UPDATE
                        SET view_count = EXCLUDED.view_count,
                            title = EXCLUDED.title
                    RETURNING id, twitch_clip_id, is_nsfw
                )
                SELECT u.id,
                       u.twitch_clip_id AS external_id,
                       u.is_nsfw,
                       COALESCE(
                           (SELECT array_agg(t.slug) FROM clip_tags ct
                            JOIN tags t ON t.id = ct.tag_id
                            WHERE ct.clip_id = u.id),
                           '{}'
                       ) AS tags
                FROM upserted u
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&clip.external_id)
            .bind(&clip.url)
            .bind(&clip.embed_url)
            .bind(&clip.title)
            .bind(&clip.creator_name)
            .bind(&clip.creator_id)
            .bind(&clip.broadcaster_name)
            .bind(&clip.broadcaster_id)
            .bind(&clip.game_id)
            .bind(&clip.language)
            .bind(&clip.thumbnail_url)
            .bind(clip.duration)
            .bind(clip.view_count)
            .bind(clip.created_at)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to import external clip {}", clip.external_id))?;

            imported.push(row);
        }

        debug!(count = imported.len(), "Imported external clips");
        Ok(imported)
    }
}
