use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite://ticker_dev.db?mode=rwc";
const DEFAULT_API_BASE: &str = "https://finance.khorami.dev/api";
const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_UPDATE_INTERVAL_MS: u64 = 30_000;
const DEFAULT_CACHE_TTL_MS: u64 = 15_000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string for the ticker configuration store.
    pub database_url: String,

    // =========================
    // Market data API
    // =========================
    /// Base URL of the market data API (`{base}/market-data/{symbol}`).
    pub api_base: String,

    /// Sent as `x-api-key` on every market data request.
    pub api_key: String,

    /// Optional bearer token sent alongside the API key.
    pub api_bearer: Option<String>,

    /// How long a fetched quote is served from memory before the upstream is
    /// asked again.
    ///
    /// Every surface polling the same symbol shares the cached value, so this
    /// bounds upstream traffic independently of the number of surfaces.
    pub cache_ttl_ms: u64,

    /// Timeout applied to every outbound HTTP call (market data and rename).
    pub http_timeout_ms: u64,

    // =========================
    // Scheduler
    // =========================
    /// Poll interval given to surfaces that do not configure their own.
    pub update_interval_ms: u64,

    // =========================
    // Rename collaborator
    // =========================
    /// Bot credential for the chat platform REST API.
    pub discord_token: String,

    pub discord_api_base: String,

    /// Emit JSON logs instead of the pretty development format.
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("FINANCE_API_KEY").ok_or(ConfigError::MissingEnv("FINANCE_API_KEY"))?;
        let discord_token = non_empty("DISCORD_TOKEN")
            .or_else(|| non_empty("CLIENT_TOKEN"))
            .ok_or(ConfigError::MissingEnv("DISCORD_TOKEN"))?;

        Ok(Self {
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),

            api_base: non_empty("FINANCE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            api_bearer: non_empty("FINANCE_API_BEARER"),
            cache_ttl_ms: positive_or(lookup("QUOTE_CACHE_TTL_MS"), DEFAULT_CACHE_TTL_MS),
            http_timeout_ms: positive_or(lookup("HTTP_TIMEOUT_MS"), DEFAULT_HTTP_TIMEOUT_MS),

            update_interval_ms: positive_or(
                lookup("UPDATE_INTERVAL_MS"),
                DEFAULT_UPDATE_INTERVAL_MS,
            ),

            discord_token,
            discord_api_base: non_empty("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string()),

            json_logs: lookup("APP_ENV").as_deref() == Some("production"),
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Parses a strictly positive integer, falling back on anything else.
fn positive_or(raw: Option<String>, fallback: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(fallback)
}
