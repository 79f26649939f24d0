use crate::market::types::Quote;

/// Longest name the chat platform accepts for a channel.
pub const MAX_NAME_LEN: usize = 96;

/// Quotes beyond this many are ignored.
pub const MAX_SEGMENTS: usize = 4;

pub const DEFAULT_TEMPLATE: &str = "{PAIR}:{PRICE}";
pub const DEFAULT_PRECISION: u8 = 3;

const SEPARATOR: &str = " | ";
const MISSING_PRICE: &str = "—";

/// Renders up to four quotes into one surface name.
///
/// Pure and deterministic: identical inputs always give the identical string,
/// which is what lets the scheduler skip redundant renames.
pub fn format_name(quotes: &[Quote], template: &str, precision: u8) -> Option<String> {
    let template = if template.trim().is_empty() {
        DEFAULT_TEMPLATE
    } else {
        template
    };
    let precision = usize::from(precision.clamp(1, 6));

    let joined = quotes
        .iter()
        .take(MAX_SEGMENTS)
        .map(|q| {
            template
                .replacen("{PAIR}", display_symbol(&q.symbol), 1)
                .replacen("{PRICE}", &format_price(q.price, precision), 1)
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let name: String = joined.trim().chars().take(MAX_NAME_LEN).collect();
    let name = name.trim_end().to_string();

    (!name.is_empty()).then_some(name)
}

/// `"ODANA:XAUUSD"` → `"XAUUSD"`; unprefixed symbols are returned as is.
pub fn display_symbol(symbol: &str) -> &str {
    symbol.split_once(':').map_or(symbol, |(_, rest)| rest)
}

fn format_price(price: Option<f64>, precision: usize) -> String {
    match price {
        Some(p) if p.is_finite() => format!("{p:.precision$}"),
        _ => MISSING_PRICE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quote(symbol: &str, price: Option<f64>) -> Quote {
        Quote {
            symbol: symbol.into(),
            price,
            ..Default::default()
        }
    }

    #[test]
    fn formats_single_quote() {
        let out = format_name(&[quote("ODANA:XAUUSD", Some(1234.5))], "{PAIR}:{PRICE}", 2);
        assert_eq!(out.as_deref(), Some("XAUUSD:1234.50"));
    }

    #[test]
    fn joins_first_four_segments() {
        let quotes: Vec<Quote> = ["A:EURUSD", "B:GBPUSD", "USDJPY", "C:XAUUSD", "D:BTCUSD"]
            .iter()
            .map(|s| quote(s, Some(1.0)))
            .collect();

        let out = format_name(&quotes, "{PAIR} {PRICE}", 1).unwrap();
        assert_eq!(out, "EURUSD 1.0 | GBPUSD 1.0 | USDJPY 1.0 | XAUUSD 1.0");
    }

    #[test]
    fn missing_price_renders_placeholder() {
        let out = format_name(&[quote("EURUSD", None), quote("GBPUSD", Some(f64::NAN))], "", 3);
        assert_eq!(out.as_deref(), Some("EURUSD:— | GBPUSD:—"));
    }

    #[test]
    fn precision_is_clamped() {
        let q = [quote("EURUSD", Some(1.123456789))];
        assert_eq!(format_name(&q, "{PRICE}", 0).as_deref(), Some("1.1"));
        assert_eq!(format_name(&q, "{PRICE}", 9).as_deref(), Some("1.123457"));
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(format_name(&[], "{PAIR}:{PRICE}", 2), None);
        assert_eq!(format_name(&[quote("", Some(1.0))], "  {PAIR}  ", 2), None);
    }

    #[test]
    fn long_names_are_truncated() {
        let q = [quote("X:ABC", Some(1.0))];
        let template = format!("{}{{PAIR}}", "ø".repeat(120));
        let out = format_name(&q, &template, 2).unwrap();
        assert_eq!(out.chars().count(), MAX_NAME_LEN);
    }

    proptest! {
        #[test]
        fn output_is_bounded_and_deterministic(
            symbols in proptest::collection::vec("[A-Z]{0,4}:?[A-Z]{1,12}", 0..8),
            price in proptest::num::f64::ANY,
            precision in 0u8..10,
            template in "[ -~]{0,60}",
        ) {
            let quotes: Vec<Quote> = symbols.iter().map(|s| quote(s, Some(price))).collect();

            let a = format_name(&quotes, &template, precision);
            let b = format_name(&quotes, &template, precision);

            prop_assert_eq!(&a, &b);
            if let Some(name) = a {
                prop_assert!(name.chars().count() <= MAX_NAME_LEN);
                prop_assert!(!name.is_empty());
            }
        }
    }
}
