use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Minimum candle history for a quote to count as healthy.
pub const MIN_CANDLES: usize = 26;

/// Interval used when a caller does not name one.
pub const DEFAULT_INTERVAL: &str = "15";

/// One OHLC candle. Missing or unparseable upstream values are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candle {
    pub time_ms: Option<i64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

impl Candle {
    pub fn ohlc(&self) -> [Option<f64>; 4] {
        [self.open, self.high, self.low, self.close]
    }

    /// All four prices present, finite and strictly positive.
    pub fn has_valid_ohlc(&self) -> bool {
        self.ohlc()
            .iter()
            .all(|v| v.is_some_and(|p| p.is_finite() && p > 0.0))
    }
}

/// A resolved market quote.
///
/// Values handed out by the resolver are owned copies; mutating one never
/// touches the cached or last-known-good record it came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub interval: String,
    pub price: Option<f64>,
    pub timestamp_ms: Option<i64>,
    pub market_open: bool,
    pub candles: Vec<Candle>,
    pub indicators: BTreeMap<String, Value>,
    pub volatility: BTreeMap<String, Value>,
    pub warnings: Vec<String>,
}

impl Quote {
    pub fn has_valid_price(&self) -> bool {
        self.price.is_some_and(|p| p.is_finite() && p > 0.0)
    }

    /// Headline timestamp, if it names a representable instant.
    pub fn resolved_timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms.and_then(resolvable_ms)
    }

    /// Most recent candle time, independent of the upstream ordering.
    pub fn latest_candle_ms(&self) -> Option<i64> {
        self.candles.iter().filter_map(|c| c.time_ms).max()
    }

    /// Appends a warning unless the exact text is already attached.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

/// `ms` if it falls inside the calendar range chrono can represent.
pub fn resolvable_ms(ms: i64) -> Option<i64> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|_| ms)
}

/// Uppercases and strips whitespace: `" odana:xauusd "` → `"ODANA:XAUUSD"`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Cache / in-flight key for a (symbol, interval) pair.
pub fn cache_key(symbol: &str, interval: &str) -> String {
    let interval = interval.trim();
    let interval = if interval.is_empty() { "default" } else { interval };
    format!("{}:{}", normalize_symbol(symbol), interval)
}
