use std::time::Duration;

use crate::display::formatter::{DEFAULT_PRECISION, DEFAULT_TEMPLATE};
use crate::error::ConfigError;
use crate::market::types::{DEFAULT_INTERVAL, normalize_symbol};

/// Per-surface ticker settings as persisted by the configuration store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickerConfig {
    pub group_id: String,
    pub surface_id: String,
    pub enabled: bool,

    /// Ordered; only the first four are rendered.
    pub symbols: Vec<String>,
    pub template: String,

    /// Decimal places, 1..=6.
    pub precision: u8,
    pub poll_interval_ms: u64,

    /// Surface name before the ticker first took it over. Restored on disable.
    pub original_name: Option<String>,
}

impl TickerConfig {
    /// Disabled ticker with default formatting.
    pub fn new(group_id: &str, surface_id: &str, poll_interval_ms: u64) -> Self {
        Self {
            group_id: group_id.to_string(),
            surface_id: surface_id.to_string(),
            enabled: false,
            symbols: Vec::new(),
            template: DEFAULT_TEMPLATE.to_string(),
            precision: DEFAULT_PRECISION,
            poll_interval_ms: poll_interval_ms.max(1),
            original_name: None,
        }
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Applies a validated patch. The original name is only recorded once.
    pub fn apply(&mut self, patch: &TickerPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(symbols) = &patch.symbols {
            self.symbols = normalize_symbols(symbols);
        }
        if let Some(template) = &patch.template {
            self.template = template.clone();
        }
        if let Some(precision) = patch.precision {
            self.precision = precision;
        }
        if let Some(ms) = patch.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if self.original_name.is_none() {
            self.original_name = patch.original_name.clone().filter(|n| !n.is_empty());
        }
    }
}

/// Partial update for one ticker. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickerPatch {
    pub enabled: Option<bool>,
    pub symbols: Option<Vec<String>>,
    pub template: Option<String>,
    pub precision: Option<u8>,
    pub poll_interval_ms: Option<u64>,
    pub original_name: Option<String>,
}

impl TickerPatch {
    pub fn enable() -> Self {
        Self {
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(p) = self.precision {
            if !(1..=6).contains(&p) {
                return Err(ConfigError::Precision(p));
            }
        }
        if self.poll_interval_ms == Some(0) {
            return Err(ConfigError::PollInterval);
        }
        if let Some(t) = &self.template {
            if !t.contains("{PAIR}") || !t.contains("{PRICE}") {
                return Err(ConfigError::Template);
            }
        }
        Ok(())
    }
}

/// Group-wide settings shared by every surface of the group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupConfig {
    pub group_id: String,
    /// Candle interval requested from the market data API.
    pub default_interval: String,
    /// Symbols shown by tickers that do not list their own.
    pub watchlist: Vec<String>,
    pub tickers: Vec<TickerConfig>,
}

impl GroupConfig {
    pub fn new(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            default_interval: DEFAULT_INTERVAL.to_string(),
            watchlist: Vec::new(),
            tickers: Vec::new(),
        }
    }

    pub fn ticker(&self, surface_id: &str) -> Option<&TickerConfig> {
        self.tickers.iter().find(|t| t.surface_id == surface_id)
    }

    pub fn enabled_tickers(&self) -> impl Iterator<Item = &TickerConfig> {
        self.tickers.iter().filter(|t| t.enabled)
    }

    /// Symbols a ticker displays: its own list, else the group watchlist.
    pub fn symbols_for(&self, ticker: &TickerConfig) -> Vec<String> {
        if ticker.symbols.is_empty() {
            self.watchlist.clone()
        } else {
            ticker.symbols.clone()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupPatch {
    pub default_interval: Option<String>,
    pub watchlist: Option<Vec<String>>,
}

impl GroupConfig {
    pub fn apply(&mut self, patch: &GroupPatch) {
        if let Some(interval) = &patch.default_interval {
            let interval = interval.trim();
            if !interval.is_empty() {
                self.default_interval = interval.to_string();
            }
        }
        if let Some(watchlist) = &patch.watchlist {
            self.watchlist = normalize_symbols(watchlist);
        }
    }
}

/// Normalizes, drops empties and duplicates, keeps order.
pub fn normalize_symbols(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw.iter().map(|s| normalize_symbol(s)) {
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_validation() {
        assert!(TickerPatch::default().validate().is_ok());

        let bad_precision = TickerPatch {
            precision: Some(7),
            ..Default::default()
        };
        assert_eq!(bad_precision.validate(), Err(ConfigError::Precision(7)));

        let bad_interval = TickerPatch {
            poll_interval_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(bad_interval.validate(), Err(ConfigError::PollInterval));

        let bad_template = TickerPatch {
            template: Some("{PAIR} only".into()),
            ..Default::default()
        };
        assert_eq!(bad_template.validate(), Err(ConfigError::Template));
    }

    #[test]
    fn apply_keeps_first_original_name() {
        let mut t = TickerConfig::new("g1", "c1", 30_000);
        t.apply(&TickerPatch {
            enabled: Some(true),
            symbols: Some(vec![" odana:xauusd".into(), "ODANA:XAUUSD".into(), "".into()]),
            original_name: Some("general-voice".into()),
            ..Default::default()
        });
        t.apply(&TickerPatch {
            original_name: Some("XAUUSD:2310.250".into()),
            ..Default::default()
        });

        assert!(t.enabled);
        assert_eq!(t.symbols, vec!["ODANA:XAUUSD"]);
        assert_eq!(t.original_name.as_deref(), Some("general-voice"));
        assert_eq!(t.template, DEFAULT_TEMPLATE);
        assert_eq!(t.precision, DEFAULT_PRECISION);
    }

    #[test]
    fn empty_symbols_fall_back_to_watchlist() {
        let mut group = GroupConfig::new("g1");
        group.apply(&GroupPatch {
            watchlist: Some(vec!["eurusd".into()]),
            ..Default::default()
        });

        let own = TickerConfig {
            symbols: vec!["GBPUSD".into()],
            ..TickerConfig::new("g1", "c1", 1_000)
        };
        let bare = TickerConfig::new("g1", "c2", 1_000);

        assert_eq!(group.symbols_for(&own), vec!["GBPUSD"]);
        assert_eq!(group.symbols_for(&bare), vec!["EURUSD"]);
        assert_eq!(group.default_interval, "15");
    }
}
