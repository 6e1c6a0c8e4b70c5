//! Twitch Helix client: the live-platform implementation of
//! `ClipRankingProvider`.
//!
//! Authenticates with an app access token (client-credentials grant) that is
//! cached until shortly before expiry. Every HTTP call, token requests
//! included, draws from the per-tick `RequestBudget`. There is no retry: a
//! 429, a timeout or an exhausted budget is returned to the caller at once.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::curation::provider::{
    ClipRankingProvider, ProviderError, RequestBudget, TimeWindow, MAX_PAGE_SIZE,
};
use crate::models::clip::ExternalClip;

const HELIX_URL: &str = "https://api.twitch.tv/helix";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
/// Tokens are refreshed this long before they actually expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HelixClip {
    id: String,
    url: String,
    embed_url: String,
    broadcaster_id: String,
    broadcaster_name: String,
    creator_id: String,
    creator_name: String,
    #[serde(default)]
    game_id: String,
    #[serde(default)]
    language: String,
    title: String,
    view_count: i64,
    created_at: DateTime<Utc>,
    #[serde(default)]
    thumbnail_url: String,
    #[serde(default)]
    duration: f64,
}

impl From<HelixClip> for ExternalClip {
    fn from(c: HelixClip) -> Self {
        ExternalClip {
            external_id: c.id,
            url: c.url,
            embed_url: c.embed_url,
            title: c.title,
            broadcaster_id: c.broadcaster_id,
            broadcaster_name: c.broadcaster_name,
            creator_id: c.creator_id,
            creator_name: c.creator_name,
            game_id: c.game_id,
            language: c.language,
            view_count: c.view_count,
            created_at: c.created_at,
            thumbnail_url: c.thumbnail_url,
            duration: c.duration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HelixGame {
    id: String,
}

#[derive(Debug, Deserialize)]
struct HelixError {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

struct AppToken {
    value: String,
    refresh_at: Instant,
}

pub struct TwitchClient {
    http: Client,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<AppToken>>,
    budget: RequestBudget,
}

impl TwitchClient {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
        request_budget: u32,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Twitch HTTP client")?;

        info!(timeout_secs = timeout.as_secs(), request_budget, "Twitch client initialized");
        Ok(Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: RwLock::new(None),
            budget: RequestBudget::new(request_budget),
        })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        self.budget.try_acquire()?;
        let request = self.http.post(TOKEN_URL).form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ]);
        let response: TokenResponse = send(request).await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = response.expires_in, "Refreshed Twitch app token");
        *slot = Some(AppToken {
            value: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn helix<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let token = self.access_token().await?;
        self.budget.try_acquire()?;

        let request = self
            .http
            .get(format!("{HELIX_URL}{path}"))
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .query(query);

        let result = send(request).await;
        if let Err(ProviderError::Api { status: 401, .. }) = &result {
            // Force a fresh token on the next call.
            *self.token.write().await = None;
        }
        result
    }

    async fn clips(&self, query: Vec<(&str, String)>) -> Result<Vec<ExternalClip>, ProviderError> {
        let page: Page<HelixClip> = self.helix("/clips", &query).await?;
        Ok(page.data.into_iter().map(ExternalClip::from).collect())
    }
}

/// Sends `request` and decodes a JSON body, mapping transport and status
/// failures onto `ProviderError`.
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }

    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unreachable(err.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Twitch API throttled the request");
        return ProviderError::Throttled;
    }
    let message = serde_json::from_str::<HelixError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string());
    ProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Query for `GET /clips`. Omitting the window asks for all-time top clips.
fn clip_query<'a>(
    key: &'a str,
    id: &str,
    window: Option<TimeWindow>,
    first: usize,
) -> Vec<(&'a str, String)> {
    let mut query = vec![
        (key, id.to_string()),
        ("first", first.clamp(1, MAX_PAGE_SIZE).to_string()),
    ];
    if let Some(window) = window {
        query.push((
            "started_at",
            window.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        query.push((
            "ended_at",
            window.ended_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    query
}

#[async_trait]
impl ClipRankingProvider for TwitchClient {
    async fn top_clips_for_game(
        &self,
        game_id: &str,
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        self.clips(clip_query("game_id", game_id, window, first)).await
    }

    async fn top_clips_for_broadcaster(
        &self,
        broadcaster_id: &str,
        window: Option<TimeWindow>,
        first: usize,
    ) -> Result<Vec<ExternalClip>, ProviderError> {
        self.clips(clip_query("broadcaster_id", broadcaster_id, window, first))
            .await
    }

    async fn top_game_ids(&self, first: usize) -> Result<Vec<String>, ProviderError> {
        let query = [("first", first.clamp(1, MAX_PAGE_SIZE).to_string())];
        let page: Page<HelixGame> = self.helix("/games/top", &query).await?;
        Ok(page.data.into_iter().map(|g| g.id).collect())
    }

    fn reset_budget(&self) {
        self.budget.reset();
    }
}
