//! Alpha Vantage payload parsing.
//!
//! The provider answers HTTP 200 for almost everything, so quota exhaustion and
//! unknown symbols have to be recognised from the body:
//!   `{"Note": ...}` / `{"Information": ...}` → rate limited
//!   `{"Error Message": ...}`                 → unknown symbol

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ── Raw rows ──────────────────────────────────────────────────────────────────

/// `GLOBAL_QUOTE` body. Every field is a string on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGlobalQuote {
    #[serde(rename = "01. symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "02. open")]
    pub open: Option<String>,
    #[serde(rename = "03. high")]
    pub high: Option<String>,
    #[serde(rename = "04. low")]
    pub low: Option<String>,
    #[serde(rename = "05. price")]
    pub price: Option<String>,
    #[serde(rename = "06. volume")]
    pub volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    pub latest_trading_day: Option<String>,
    #[serde(rename = "10. change percent")]
    pub change_pct: Option<String>,
}

/// One `Time Series (Daily)` entry, keyed by date in the enclosing map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDailyEntry {
    #[serde(rename = "1. open")]
    pub open: String,
    #[serde(rename = "2. high")]
    pub high: String,
    #[serde(rename = "3. low")]
    pub low: String,
    #[serde(rename = "4. close")]
    pub close: String,
    #[serde(rename = "5. volume")]
    pub volume: String,
}

#[derive(Deserialize)]
struct GlobalQuoteEnvelope {
    #[serde(rename = "Global Quote", default)]
    quote: Option<RawGlobalQuote>,
}

#[derive(Deserialize)]
struct DailySeriesEnvelope {
    #[serde(rename = "Time Series (Daily)", default)]
    series: Option<BTreeMap<String, RawDailyEntry>>,
}

// ── Provider signals ──────────────────────────────────────────────────────────

fn check_provider_signal(body: &Value, symbol: &str) -> Result<()> {
    for key in ["Note", "Information"] {
        if let Some(msg) = body.get(key) {
            return Err(Error::RateLimited(
                msg.as_str().unwrap_or("request frequency exceeded").to_string(),
            ));
        }
    }
    if body.get("Error Message").is_some() {
        return Err(Error::NotFound(symbol.to_string()));
    }
    Ok(())
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

pub fn parse_global_quote(body: &str, symbol: &str) -> Result<RawGlobalQuote> {
    let value: Value = serde_json::from_str(body)?;
    check_provider_signal(&value, symbol)?;

    let envelope: GlobalQuoteEnvelope = serde_json::from_value(value)?;
    match envelope.quote {
        Some(q) if q.symbol.is_some() => Ok(q),
        _ => Err(Error::NotFound(symbol.to_string())),
    }
}

/// Daily rows, newest first, at most `limit` of them.
pub fn parse_daily_series(
    body: &str,
    symbol: &str,
    limit: usize,
) -> Result<Vec<(String, RawDailyEntry)>> {
    let value: Value = serde_json::from_str(body)?;
    check_provider_signal(&value, symbol)?;

    let envelope: DailySeriesEnvelope = serde_json::from_value(value)?;
    let Some(series) = envelope.series else {
        return Err(Error::NotFound(symbol.to_string()));
    };

    // ISO dates sort lexically, so the map is already oldest → newest
    Ok(series.into_iter().rev().take(limit).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAILY: &str = r#"{
        "Meta Data": { "2. Symbol": "IBM" },
        "Time Series (Daily)": {
            "2024-03-01": { "1. open": "185.0", "2. high": "188.0", "3. low": "184.0", "4. close": "187.5", "5. volume": "4000000" },
            "2024-03-04": { "1. open": "187.5", "2. high": "190.0", "3. low": "186.0", "4. close": "189.0", "5. volume": "3500000" },
            "2024-02-29": { "1. open": "183.0", "2. high": "185.5", "3. low": "182.0", "4. close": "185.0", "5. volume": "5000000" }
        }
    }"#;

    #[test]
    fn daily_series_is_newest_first_and_truncated() {
        let rows = parse_daily_series(DAILY, "IBM", 2).unwrap();
        let dates: Vec<&str> = rows.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-04", "2024-03-01"]);
        assert_eq!(rows[0].1.close, "189.0");
    }

    #[test]
    fn note_body_is_rate_limit() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"}"#;
        assert!(matches!(parse_daily_series(body, "TSLA", 30), Err(Error::RateLimited(_))));
        assert!(matches!(parse_global_quote(body, "TSLA"), Err(Error::RateLimited(_))));

        let info = r#"{"Information": "daily rate limit reached"}"#;
        assert!(matches!(parse_global_quote(info, "TSLA"), Err(Error::RateLimited(_))));
    }

    #[test]
    fn error_message_and_empty_quote_are_not_found() {
        let err = r#"{"Error Message": "Invalid API call."}"#;
        assert!(matches!(parse_daily_series(err, "ZZZZ", 30), Err(Error::NotFound(_))));

        let empty = r#"{"Global Quote": {}}"#;
        assert!(matches!(parse_global_quote(empty, "ZZZZ"), Err(Error::NotFound(_))));
    }

    #[test]
    fn global_quote_fields() {
        let body = r#"{"Global Quote": {
            "01. symbol": "IBM", "02. open": "185.0", "03. high": "188.0", "04. low": "184.0",
            "05. price": "187.5", "06. volume": "4000000", "07. latest trading day": "2024-03-01",
            "08. previous close": "185.0", "09. change": "2.5", "10. change percent": "1.3514%"
        }}"#;
        let q = parse_global_quote(body, "IBM").unwrap();
        assert_eq!(q.symbol.as_deref(), Some("IBM"));
        assert_eq!(q.change_pct.as_deref(), Some("1.3514%"));
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(parse_global_quote("<html>", "IBM"), Err(Error::Decode(_))));
    }
}
