//! Quote resolution: cache, in-flight coalescing, validation and
//! last-known-good fallback in front of a [`QuoteSource`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use common::logger::warn_if_slow;

use crate::error::QuoteError;
use crate::market::cache::QuoteCache;
use crate::market::client::QuoteSource;
use crate::market::inflight::{FetchRole, InFlightCoordinator};
use crate::market::types::{DEFAULT_INTERVAL, MIN_CANDLES, Quote, cache_key, normalize_symbol};
use crate::market::validator::{QuoteValidator, WarningThrottle, is_healthy};
use crate::metrics::counters::Counters;
use crate::time::now_ms;

const SLOW_FETCH: Duration = Duration::from_secs(2);

pub const BLENDED_NOTE: &str = "blended with cached data after data quality issues";

/// Why a last-known-good quote was served.
#[derive(Clone, Debug, PartialEq)]
pub enum FallbackReason {
    FetchFailed(QuoteError),
    DataQuality(Vec<String>),
}

/// Result of one resolution. Failure is the `Err` side of
/// [`QuoteResolver::resolve_outcome`].
#[derive(Clone, Debug, PartialEq)]
pub enum QuoteOutcome {
    Success(Quote),
    FallbackUsed { quote: Quote, reason: FallbackReason },
}

impl QuoteOutcome {
    pub fn quote(&self) -> &Quote {
        match self {
            Self::Success(q) | Self::FallbackUsed { quote: q, .. } => q,
        }
    }

    pub fn into_quote(self) -> Quote {
        match self {
            Self::Success(q) | Self::FallbackUsed { quote: q, .. } => q,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::FallbackUsed { .. })
    }
}

type FetchResult = Result<QuoteOutcome, QuoteError>;

/// Shared entry point for quotes. Cheap to clone; clones share the cache and
/// in-flight registry.
#[derive(Clone)]
pub struct QuoteResolver {
    source: Arc<dyn QuoteSource>,
    cache: QuoteCache,
    inflight: InFlightCoordinator<FetchResult>,
    validator: QuoteValidator,
    throttle: WarningThrottle,
    counters: Counters,
}

impl QuoteResolver {
    pub fn new(source: Arc<dyn QuoteSource>, cache: QuoteCache, counters: Counters) -> Self {
        Self {
            source,
            cache,
            inflight: InFlightCoordinator::new(),
            validator: QuoteValidator::default(),
            throttle: WarningThrottle::default(),
            counters,
        }
    }

    pub fn with_validator(mut self, validator: QuoteValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    /// Resolves a quote, fallbacks included.
    pub async fn resolve(&self, symbol: &str, interval: &str) -> Result<Quote, QuoteError> {
        self.resolve_outcome(symbol, interval)
            .await
            .map(QuoteOutcome::into_quote)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn resolve_outcome(&self, symbol: &str, interval: &str) -> FetchResult {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(QuoteError::MissingSymbol);
        }
        let interval = match interval.trim() {
            "" => DEFAULT_INTERVAL.to_string(),
            s => s.to_string(),
        };
        let key = cache_key(&symbol, &interval);

        if let Some(hit) = self.cache.get_fresh(&key) {
            Counters::bump(&self.counters.cache_hits);
            debug!(key = %key, "quote cache hit");
            return Ok(QuoteOutcome::Success(hit));
        }

        let this = self.clone();
        let fetch_key = key.clone();
        let (out, role) = self
            .inflight
            .run(&key, move || async move {
                this.fetch_and_settle(&fetch_key, &symbol, &interval).await
            })
            .await;

        if role == FetchRole::Follower {
            Counters::bump(&self.counters.coalesced_waits);
        }

        match out {
            Some(result) => result,
            None => {
                let err = QuoteError::Aborted {
                    symbol: key.clone(),
                };
                self.fallback_after_failure(&key, err)
            }
        }
    }

    /// Performs the single upstream fetch for `key` and settles the cache.
    async fn fetch_and_settle(&self, key: &str, symbol: &str, interval: &str) -> FetchResult {
        Counters::bump(&self.counters.upstream_fetches);

        let fetched = warn_if_slow(
            "market_data_fetch",
            SLOW_FETCH,
            self.source.fetch(symbol, interval),
        )
        .await;

        let incoming = match fetched {
            Ok(q) => q,
            Err(err) => return self.fallback_after_failure(key, err),
        };

        let issues = self.validator.validate(&incoming, now_ms());
        let critical: Vec<String> = issues
            .iter()
            .filter(|i| i.is_critical())
            .map(|i| i.message.clone())
            .collect();

        for issue in &issues {
            if self.throttle.should_log(key, &issue.message) {
                warn!(key, critical = issue.is_critical(), issue = %issue.message, "quote data quality issue");
            }
        }

        let outcome = match self.cache.last_good(key) {
            Some(fallback) if !critical.is_empty() => {
                let mut merged = merge_with_fallback(&incoming, fallback);
                for issue in &issues {
                    merged.push_warning(issue.message.clone());
                }
                merged.push_warning(BLENDED_NOTE);
                Counters::bump(&self.counters.fallbacks_used);
                info!(key, "blended incoming quote with last known good");
                QuoteOutcome::FallbackUsed {
                    quote: merged,
                    reason: FallbackReason::DataQuality(critical),
                }
            }
            _ => {
                let mut quote = incoming;
                for issue in &issues {
                    quote.push_warning(issue.message.clone());
                }
                QuoteOutcome::Success(quote)
            }
        };

        let quote = outcome.quote();
        if is_healthy(&self.validator.validate(quote, now_ms())) {
            self.cache.remember_good(key, quote);
        }
        self.cache.put(key, quote);

        Ok(outcome)
    }

    fn fallback_after_failure(&self, key: &str, err: QuoteError) -> FetchResult {
        let Some(mut quote) = self.cache.last_good(key) else {
            warn!(key, error = %err, "quote fetch failed with no fallback");
            return Err(err);
        };

        quote.push_warning(err.fallback_note());
        self.cache.put(key, &quote);
        Counters::bump(&self.counters.fallbacks_used);
        warn!(key, error = %err, "quote fetch failed; serving last known good");

        Ok(QuoteOutcome::FallbackUsed {
            quote,
            reason: FallbackReason::FetchFailed(err),
        })
    }
}

/// Blends an incoming quote that failed critical checks with the last
/// known good one. `fallback` is owned so the stored record is never aliased.
pub fn merge_with_fallback(incoming: &Quote, fallback: Quote) -> Quote {
    let mut merged = fallback;

    if incoming.has_valid_price() {
        merged.price = incoming.price;
    }
    if incoming.resolved_timestamp_ms().is_some() {
        merged.timestamp_ms = incoming.timestamp_ms;
    }
    if incoming.candles.len() >= MIN_CANDLES {
        merged.candles = incoming.candles.clone();
    }
    for (k, v) in &incoming.indicators {
        merged.indicators.insert(k.clone(), v.clone());
    }
    for (k, v) in &incoming.volatility {
        merged.volatility.insert(k.clone(), v.clone());
    }
    merged.market_open = incoming.market_open;
    merged.warnings.clear();

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::Candle;
    use serde_json::json;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                time_ms: Some(1_000_000 - i as i64),
                open: Some(1.0),
                high: Some(1.0),
                low: Some(1.0),
                close: Some(1.0),
            })
            .collect()
    }

    #[test]
    fn merge_takes_valid_incoming_fields_only() {
        let mut fallback = Quote {
            price: Some(2300.0),
            timestamp_ms: Some(10),
            candles: candles(30),
            ..Default::default()
        };
        fallback.indicators.insert("rsi".into(), json!(40));
        fallback.indicators.insert("ema".into(), json!(2290));

        let mut incoming = Quote {
            price: Some(-1.0),
            timestamp_ms: Some(20),
            candles: candles(5),
            market_open: false,
            ..Default::default()
        };
        incoming.indicators.insert("rsi".into(), json!(55));

        let merged = merge_with_fallback(&incoming, fallback);

        assert_eq!(merged.price, Some(2300.0));
        assert_eq!(merged.timestamp_ms, Some(20));
        assert_eq!(merged.candles.len(), 30);
        assert_eq!(merged.indicators.get("rsi"), Some(&json!(55)));
        assert_eq!(merged.indicators.get("ema"), Some(&json!(2290)));
        assert!(!merged.market_open);
    }

    #[test]
    fn merge_replaces_candles_with_enough_history() {
        let fallback = Quote {
            candles: candles(30),
            ..Default::default()
        };
        let incoming = Quote {
            price: Some(5.0),
            candles: candles(26),
            ..Default::default()
        };

        let merged = merge_with_fallback(&incoming, fallback);
        assert_eq!(merged.candles.len(), 26);
        assert_eq!(merged.price, Some(5.0));
        assert!(merged.timestamp_ms.is_none());
    }
}
