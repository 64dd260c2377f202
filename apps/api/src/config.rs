use std::time::Duration;

use anyhow::{Context, Result};

use crate::analysis::session::TRIGGER_THROTTLE;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub extractor_url: String,
    /// Absent → quality analysis is disabled, not an error.
    pub anthropic_api_key: Option<String>,
    pub trigger_throttle: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let trigger_throttle = match std::env::var("TRIGGER_THROTTLE_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("TRIGGER_THROTTLE_SECS must be a number of seconds")?,
            ),
            Err(_) => TRIGGER_THROTTLE,
        };

        Ok(Config {
            redis_url: require_env("REDIS_URL")?,
            extractor_url: require_env("EXTRACTOR_URL")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            trigger_throttle,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
