use crate::models::{Bar, Quote};
use crate::quotes::parsers::{RawDailyEntry, RawGlobalQuote};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

// ── Field parsers ─────────────────────────────────────────────────────────────

/// Parse a provider price string. "189.8400" → 189.84 | "" → None
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "-" || s == "None" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok().filter(|v: &f64| v.is_finite())
}

/// "1,234,567" → 1234567. The sign is kept so a negative volume fails validation.
pub fn parse_volume(s: &str) -> Option<i64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// "-1.2345%" → -1.2345
pub fn parse_pct(s: &str) -> Option<f64> {
    let s = s.trim().replace(['%', ','], "");
    if s.is_empty() || s == "N/A" || s == "-" {
        return None;
    }
    s.parse().ok().filter(|v: &f64| v.is_finite())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .ok()
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

// ── Provider rows → domain ────────────────────────────────────────────────────

pub fn global_quote_to_quote(raw: &RawGlobalQuote, now: NaiveDateTime) -> Option<Quote> {
    let symbol = normalise_symbol(raw.symbol.as_deref()?);
    if symbol.is_empty() {
        return None;
    }
    let price = raw.price.as_deref().and_then(parse_price)?;

    Some(Quote {
        name: symbol.clone(),
        price,
        change_pct: raw.change_pct.as_deref().and_then(parse_pct).unwrap_or(0.0),
        volume: raw.volume.as_deref().and_then(parse_volume).unwrap_or(0),
        open: raw.open.as_deref().and_then(parse_price).unwrap_or(0.0),
        high: raw.high.as_deref().and_then(parse_price).unwrap_or(0.0),
        low: raw.low.as_deref().and_then(parse_price).unwrap_or(0.0),
        close: price,
        latest_trading_day: raw.latest_trading_day.as_deref().and_then(parse_date),
        updated_at: now,
        symbol,
    })
}

pub fn daily_entry_to_bar(symbol: &str, date_str: &str, row: &RawDailyEntry) -> Option<Bar> {
    let date = parse_date(date_str)?;
    let close = parse_price(&row.close)?;

    let bar = Bar {
        symbol: normalise_symbol(symbol),
        date,
        open: parse_price(&row.open).unwrap_or(0.0),
        high: parse_price(&row.high).unwrap_or(0.0),
        low: parse_price(&row.low).unwrap_or(0.0),
        close,
        volume: parse_volume(&row.volume).unwrap_or(0),
    };

    if !bar.is_valid() {
        warn!("Dropping invalid bar for {} on {} (close {})", symbol, date, close);
        return None;
    }
    Some(bar)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
