use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Both halves must be set for the external strategies to work.
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
    pub scheduler_enabled: bool,
    pub scheduler_tick_minutes: u64,
    pub scheduler_max_concurrent: usize,
    pub provider_timeout_secs: u64,
    /// Provider requests allowed per scheduler tick.
    pub provider_request_budget: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            twitch_client_id: optional_env("TWITCH_CLIENT_ID"),
            twitch_client_secret: optional_env("TWITCH_CLIENT_SECRET"),
            scheduler_enabled: parse_env("SCHEDULER_ENABLED", true)?,
            scheduler_tick_minutes: parse_env("SCHEDULER_TICK_MINUTES", 5)?,
            scheduler_max_concurrent: parse_env("SCHEDULER_MAX_CONCURRENT", 4)?,
            provider_timeout_secs: parse_env("PROVIDER_TIMEOUT_SECS", 10)?,
            provider_request_budget: parse_env("PROVIDER_REQUEST_BUDGET", 100)?,
        })
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_minutes.max(1) * 60)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    /// Client id and secret, when both are configured.
    pub fn twitch_credentials(&self) -> Option<(&str, &str)> {
        match (&self.twitch_client_id, &self.twitch_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/curator_test".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            twitch_client_id: None,
            twitch_client_secret: None,
            scheduler_enabled: false,
            scheduler_tick_minutes: 5,
            scheduler_max_concurrent: 4,
            provider_timeout_secs: 10,
            provider_request_budget: 100,
        }
    }
}
