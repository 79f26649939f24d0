use std::time::Duration;

use thiserror::Error;

/// Failure to produce a quote.
///
/// Cloneable because one upstream fetch is shared by every caller that was
/// waiting on the same key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("missing symbol")]
    MissingSymbol,

    #[error("no market data found for {symbol}")]
    NotFound { symbol: String },

    #[error("market data request for {symbol} failed with status {status}")]
    Status { symbol: String, status: u16 },

    #[error("market data request for {symbol} failed: {message}")]
    Transport { symbol: String, message: String },

    #[error("empty payload from market data API for {symbol}")]
    EmptyPayload { symbol: String },

    #[error("malformed payload for {symbol}: {message}")]
    Malformed { symbol: String, message: String },

    #[error("market data fetch for {symbol} was aborted")]
    Aborted { symbol: String },
}

impl QuoteError {
    /// Warning attached to a last-known-good quote served in place of a
    /// failed live fetch.
    pub fn fallback_note(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "symbol not found upstream; showing cached data",
            Self::EmptyPayload { .. } | Self::Malformed { .. } => {
                "upstream returned no usable data; showing cached data"
            }
            _ => "live fetch failed; showing cached data",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failure reported by the rename collaborator.
#[derive(Error, Debug)]
pub enum RenameError {
    #[error("surface {surface_id} no longer exists")]
    SurfaceMissing { surface_id: String },

    #[error("rename of {surface_id} rate limited")]
    RateLimited {
        surface_id: String,
        retry_after: Option<Duration>,
    },

    #[error("rename rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("rename request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Invalid ticker settings or environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("precision must be between 1 and 6, got {0}")]
    Precision(u8),

    #[error("poll interval must be greater than zero")]
    PollInterval,

    #[error("template must contain {{PAIR}} and {{PRICE}}")]
    Template,

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
}

/// Anything that makes a single scheduler tick fail and back off.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("config store unavailable: {0:#}")]
    Store(anyhow::Error),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Rename(#[from] RenameError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_note_depends_on_failure_class() {
        let not_found = QuoteError::NotFound {
            symbol: "ODANA:XAUUSD".into(),
        };
        let status = QuoteError::Status {
            symbol: "ODANA:XAUUSD".into(),
            status: 503,
        };
        let empty = QuoteError::EmptyPayload {
            symbol: "ODANA:XAUUSD".into(),
        };

        assert!(not_found.is_not_found());
        assert!(not_found.fallback_note().contains("not found"));
        assert_eq!(
            status.fallback_note(),
            "live fetch failed; showing cached data"
        );
        assert!(empty.fallback_note().contains("no usable data"));
    }

    #[test]
    fn error_display() {
        let err = QuoteError::Status {
            symbol: "EURUSD".into(),
            status: 502,
        };
        assert_eq!(
            err.to_string(),
            "market data request for EURUSD failed with status 502"
        );

        assert_eq!(
            ConfigError::Template.to_string(),
            "template must contain {PAIR} and {PRICE}"
        );
    }

    #[test]
    fn tick_error_wraps_layers() {
        let err: TickError = QuoteError::MissingSymbol.into();
        assert_eq!(err.to_string(), "missing symbol");

        let err = TickError::Store(anyhow::anyhow!("db locked"));
        assert_eq!(err.to_string(), "config store unavailable: db locked");
    }
}
