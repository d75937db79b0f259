use std::time::Duration;

use anyhow::{Context, Result};

use crate::enhancement::poller::PollSettings;

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api/v1/";

/// Application configuration loaded from environment variables.
/// Fails at startup if a numeric variable cannot be parsed.
#[derive(Debug, Clone)]
pub struct Config {
    pub enhance_api_base_url: String,
    /// Sent as `X-API-Key`. Missing keys surface per call, not at startup.
    pub enhance_api_key: Option<String>,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub http_timeout: Duration,
    /// The year that "Present" end dates resolve to.
    pub current_year: i32,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            enhance_api_base_url: std::env::var("ENHANCE_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            enhance_api_key: std::env::var("ENHANCE_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            poll_interval: Duration::from_millis(parse_env("ENHANCE_POLL_INTERVAL_MS", 2000)?),
            max_wait: Duration::from_secs(parse_env("ENHANCE_MAX_WAIT_SECS", 30)?),
            http_timeout: Duration::from_secs(parse_env("ENHANCE_HTTP_TIMEOUT_SECS", 30)?),
            current_year: parse_env("RESUME_CURRENT_YEAR", 2025)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            max_wait: self.max_wait,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' must be a valid number")),
        Err(_) => Ok(default),
    }
}
