//! Data-quality checks for freshly fetched quotes.
//!
//! Checks never fail a resolution on their own. Critical issues make the
//! resolver blend the incoming payload with the last-known-good quote;
//! informational issues are only attached as warnings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::market::types::{MIN_CANDLES, Quote, resolvable_ms};
use crate::time::MINUTE_MS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Informational,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    fn critical(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Informational,
            message: message.into(),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ValidatorConfig {
    pub min_candles: usize,
    /// Headline timestamp older than this is reported as stale.
    pub max_age_ms: i64,
    /// Allowed gap between the newest candle and the headline timestamp.
    pub max_candle_drift_ms: i64,
    /// A closed market reporting data younger than this is suspicious.
    pub closed_fresh_window_ms: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_candles: MIN_CANDLES,
            max_age_ms: 90 * MINUTE_MS,
            max_candle_drift_ms: 5 * MINUTE_MS,
            closed_fresh_window_ms: 15 * MINUTE_MS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QuoteValidator {
    cfg: ValidatorConfig,
}

impl QuoteValidator {
    pub fn new(cfg: ValidatorConfig) -> Self {
        Self { cfg }
    }

    /// Runs every check against `quote` as seen at `now_ms`.
    /// Issues come back in check order; all checks always run.
    pub fn validate(&self, quote: &Quote, now_ms: i64) -> Vec<ValidationIssue> {
        let cfg = &self.cfg;
        let mut issues = Vec::new();

        if !quote.has_valid_price() {
            issues.push(ValidationIssue::critical("price invalid"));
        }

        let age_ms = quote
            .resolved_timestamp_ms()
            .map(|ts| now_ms.saturating_sub(ts));
        match age_ms {
            None => issues.push(ValidationIssue::critical("timestamp invalid")),
            Some(age) if age > cfg.max_age_ms => issues.push(ValidationIssue::info(format!(
                "data is {} minutes old",
                age / MINUTE_MS
            ))),
            Some(_) => {}
        }

        let candles = &quote.candles;
        if candles.len() < cfg.min_candles {
            issues.push(ValidationIssue::critical(format!(
                "insufficient candle data ({}/{})",
                candles.len(),
                cfg.min_candles
            )));
        } else {
            if candles.iter().any(|c| c.time_ms.is_none()) {
                issues.push(ValidationIssue::info("candle missing timestamp"));
            }

            // Newest first; equal neighbours are allowed.
            let times: Vec<i64> = candles.iter().filter_map(|c| c.time_ms).collect();
            if times.windows(2).any(|w| w[1] > w[0]) {
                issues.push(ValidationIssue::critical("candles out of order"));
            }

            if candles.iter().any(|c| !c.has_valid_ohlc()) {
                issues.push(ValidationIssue::critical("invalid OHLC"));
            }

            let latest = quote.latest_candle_ms().and_then(resolvable_ms);
            if let (Some(latest), Some(ts)) = (latest, quote.resolved_timestamp_ms()) {
                let drift = ts.saturating_sub(latest).saturating_abs();
                if drift > cfg.max_candle_drift_ms {
                    issues.push(ValidationIssue::info(format!(
                        "latest candle is {} minutes from quote timestamp",
                        drift / MINUTE_MS
                    )));
                }
            }
        }

        if !quote.market_open && age_ms.is_some_and(|age| age < cfg.closed_fresh_window_ms) {
            issues.push(ValidationIssue::info("market reported closed but data is fresh"));
        }

        issues
    }
}

/// Healthy = no critical issue.
pub fn is_healthy(issues: &[ValidationIssue]) -> bool {
    !issues.iter().any(ValidationIssue::is_critical)
}

/// Suppresses repeated identical warnings per key for a fixed window.
#[derive(Clone)]
pub struct WarningThrottle {
    window: Duration,
    seen: Arc<Mutex<HashMap<(String, String), Instant>>>,
}

impl WarningThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True if `(key, message)` should be logged now.
    pub fn should_log(&self, key: &str, message: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        seen.retain(|_, at| now.duration_since(*at) < self.window);

        let id = (key.to_string(), message.to_string());
        if seen.contains_key(&id) {
            return false;
        }
        seen.insert(id, now);
        true
    }
}

impl Default for WarningThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}
