use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, instrument};

use crate::error::QuoteError;
use crate::market::payload::parse_quote;
use crate::market::types::Quote;

/// Upstream source of raw quotes.
///
/// Implementations perform exactly one request per call; caching, coalescing
/// and fallback live in the resolver.
#[async_trait]
pub trait QuoteSource: Send + Sync + 'static {
    async fn fetch(&self, symbol: &str, interval: &str) -> Result<Quote, QuoteError>;
}

/// HTTP client for `GET {base}/market-data/{symbol}?interval={interval}`.
#[derive(Clone)]
pub struct MarketDataClient {
    http: Client,
    base: Url,
    api_key: String,
    bearer: Option<String>,
}

impl MarketDataClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        bearer: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid market data base url {base_url}"))?;
        if base.cannot_be_a_base() {
            bail!("market data base url {base_url} cannot carry a path");
        }

        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base,
            api_key,
            bearer,
        })
    }

    /// Full request URL; the symbol is percent-encoded as one path segment.
    pub fn quote_url(&self, symbol: &str, interval: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("market-data").push(symbol);
        }
        if !interval.is_empty() {
            url.query_pairs_mut().append_pair("interval", interval);
        }
        url
    }
}

#[async_trait]
impl QuoteSource for MarketDataClient {
    #[instrument(skip(self), fields(symbol = %symbol, interval = %interval), level = "debug")]
    async fn fetch(&self, symbol: &str, interval: &str) -> Result<Quote, QuoteError> {
        let transport = |e: reqwest::Error| QuoteError::Transport {
            symbol: symbol.to_string(),
            message: e.to_string(),
        };

        let mut req = self
            .http
            .get(self.quote_url(symbol, interval))
            .header(ACCEPT, "application/json")
            .header("x-api-key", &self.api_key);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            return Err(QuoteError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(QuoteError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(transport)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(QuoteError::EmptyPayload {
                symbol: symbol.to_string(),
            });
        }

        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| QuoteError::Malformed {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;

        let quote = parse_quote(symbol, interval, &value)?;

        debug!(
            price = ?quote.price,
            candles = quote.candles.len(),
            "market data fetched"
        );

        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> MarketDataClient {
        MarketDataClient::new(base, "key".into(), None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn builds_quote_url_with_encoded_symbol() {
        let c = client("https://finance.example.com/api/");
        let url = c.quote_url("ODANA:XAU/USD", "15");

        assert_eq!(
            url.as_str(),
            "https://finance.example.com/api/market-data/ODANA:XAU%2FUSD?interval=15"
        );
    }

    #[test]
    fn omits_empty_interval() {
        let c = client("https://finance.example.com/api");
        let url = c.quote_url("EURUSD", "");
        assert_eq!(url.as_str(), "https://finance.example.com/api/market-data/EURUSD");
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = MarketDataClient::new("mailto:ops@example.com", "k".into(), None, Duration::from_secs(1));
        assert!(err.is_err());

        let err = MarketDataClient::new("not a url", "k".into(), None, Duration::from_secs(1));
        assert!(err.is_err());
    }
}
