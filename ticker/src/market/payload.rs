//! Lenient decoding of market data API bodies.
//!
//! The upstream is loosely typed: numbers sometimes arrive as strings and
//! timestamps as either epoch milliseconds or ISO-8601 text. Anything that
//! cannot be decoded becomes `None` and is left for the validator to flag.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

use crate::error::QuoteError;
use crate::market::types::{Candle, Quote, resolvable_ms};

/// Decodes a JSON body into a [`Quote`].
///
/// Only a missing or empty object is an error; every other defect is a data
/// quality issue handled downstream.
pub fn parse_quote(symbol: &str, interval: &str, body: &Value) -> Result<Quote, QuoteError> {
    let obj = match body.as_object() {
        Some(obj) if !obj.is_empty() => obj,
        _ => {
            return Err(QuoteError::EmptyPayload {
                symbol: symbol.to_string(),
            });
        }
    };

    let candles = obj
        .get("candles")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(parse_candle).collect())
        .unwrap_or_default();

    // Only an explicit `isOpen: false` marks the market as closed.
    let market_open = obj
        .get("marketStatus")
        .and_then(|s| s.get("isOpen"))
        .and_then(Value::as_bool)
        != Some(false);

    Ok(Quote {
        symbol: obj
            .get("symbol")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(symbol)
            .to_string(),
        interval: interval_field(obj).unwrap_or_else(|| interval.to_string()),
        price: obj.get("price").and_then(number),
        timestamp_ms: obj.get("timestamp").and_then(timestamp_ms),
        market_open,
        candles,
        indicators: object_map(obj.get("indicators")),
        volatility: object_map(obj.get("volatility")),
        warnings: Vec::new(),
    })
}

fn parse_candle(raw: &Value) -> Candle {
    Candle {
        time_ms: raw.get("time").and_then(timestamp_ms),
        open: raw.get("open").and_then(number),
        high: raw.get("high").and_then(number),
        low: raw.get("low").and_then(number),
        close: raw.get("close").and_then(number),
    }
}

fn interval_field(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("interval")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn object_map(raw: Option<&Value>) -> BTreeMap<String, Value> {
    raw.and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// Number or numeric string.
pub fn number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Epoch milliseconds, numeric string, or ISO-8601 text. Values outside the
/// representable calendar range are treated as missing.
pub fn timestamp_ms(raw: &Value) -> Option<i64> {
    let ms = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => parse_time_str(s.trim()),
        _ => None,
    };
    ms.and_then(resolvable_ms)
}

fn parse_time_str(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    // Zone-less ISO text is taken as UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_payload() {
        let body = json!({
            "symbol": "ODANA:XAUUSD",
            "price": 2310.25,
            "timestamp": 1_700_000_000_000i64,
            "candles": [
                {"open": 1, "high": 2, "low": 0.5, "close": 1.5, "time": 1_700_000_000_000i64},
                {"open": "1.1", "high": "2.2", "low": "0.9", "close": "1.4", "time": "2023-11-14T22:13:20Z"}
            ],
            "indicators": {"rsi": 55.2},
            "volatility": {"atr": 3.1},
            "marketStatus": {"isOpen": true}
        });

        let q = parse_quote("ODANA:XAUUSD", "15", &body).unwrap();

        assert_eq!(q.symbol, "ODANA:XAUUSD");
        assert_eq!(q.interval, "15");
        assert_eq!(q.price, Some(2310.25));
        assert_eq!(q.timestamp_ms, Some(1_700_000_000_000));
        assert!(q.market_open);
        assert_eq!(q.candles.len(), 2);
        assert_eq!(q.candles[1].open, Some(1.1));
        assert_eq!(q.candles[1].time_ms, Some(1_700_000_000_000));
        assert_eq!(q.indicators.get("rsi"), Some(&json!(55.2)));
        assert_eq!(q.volatility.get("atr"), Some(&json!(3.1)));
    }

    #[test]
    fn empty_or_non_object_body_is_empty_payload() {
        for body in [json!({}), json!(null), json!([1, 2]), json!("nope")] {
            let err = parse_quote("EURUSD", "15", &body).unwrap_err();
            assert_eq!(
                err,
                QuoteError::EmptyPayload {
                    symbol: "EURUSD".into()
                }
            );
        }
    }

    #[test]
    fn missing_fields_become_none() {
        let q = parse_quote("EURUSD", "60", &json!({"price": "n/a"})).unwrap();

        assert_eq!(q.symbol, "EURUSD");
        assert_eq!(q.interval, "60");
        assert!(q.price.is_none());
        assert!(q.timestamp_ms.is_none());
        assert!(q.candles.is_empty());
        assert!(q.market_open);
    }

    #[test]
    fn only_explicit_false_marks_market_closed() {
        let closed = parse_quote("X", "15", &json!({"price": 1, "marketStatus": {"isOpen": false}}))
            .unwrap();
        let unknown = parse_quote("X", "15", &json!({"price": 1, "marketStatus": {}})).unwrap();

        assert!(!closed.market_open);
        assert!(unknown.market_open);
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(timestamp_ms(&json!(1_000)), Some(1_000));
        assert_eq!(timestamp_ms(&json!("1000")), Some(1_000));
        assert_eq!(
            timestamp_ms(&json!("1970-01-01T00:00:01.500Z")),
            Some(1_500)
        );
        assert_eq!(timestamp_ms(&json!("1970-01-01T00:00:02")), Some(2_000));
        assert_eq!(timestamp_ms(&json!("yesterday")), None);
        assert_eq!(timestamp_ms(&json!(true)), None);
    }

    #[test]
    fn out_of_range_timestamps_are_missing() {
        assert_eq!(timestamp_ms(&json!(-1e300)), None);
        assert_eq!(timestamp_ms(&json!(1e300)), None);
        assert_eq!(timestamp_ms(&json!(i64::MIN)), None);
        assert_eq!(timestamp_ms(&json!(i64::MAX.to_string())), None);

        let q = parse_quote("EURUSD", "15", &json!({"price": 1.08, "timestamp": -1e300})).unwrap();
        assert_eq!(q.timestamp_ms, None);
    }
}
