use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Daily bar ─────────────────────────────────────────────────────────────────

/// One trading day of OHLCV for a symbol. (symbol, date) identifies the bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Close must be positive; every other field non-negative.
    pub fn is_valid(&self) -> bool {
        self.close > 0.0
            && self.open >= 0.0
            && self.high >= 0.0
            && self.low >= 0.0
            && self.volume >= 0
    }
}

// ── Quote snapshot ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    /// Signed, percent units (1.5 means +1.5%).
    pub change_pct: f64,
    pub volume: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub latest_trading_day: Option<NaiveDate>,
    pub updated_at: NaiveDateTime,
}

// ── Watch-list entry ──────────────────────────────────────────────────────────

/// Entry of the favorites or recently-viewed list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchItem {
    pub symbol: String,
    pub name: String,
    pub price: Option<f64>,
    pub change_pct: Option<f64>,
}

impl WatchItem {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            price: None,
            change_pct: None,
        }
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() || self.name == self.symbol {
            self.symbol.clone()
        } else {
            format!("{} - {}", self.symbol, self.name)
        }
    }
}

impl From<&Quote> for WatchItem {
    fn from(q: &Quote) -> Self {
        Self {
            symbol: q.symbol.clone(),
            name: q.name.clone(),
            price: Some(q.price),
            change_pct: Some(q.change_pct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64, volume: i64) -> Bar {
        Bar {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close,
            volume,
        }
    }

    #[test]
    fn bar_validity() {
        assert!(bar(1.5, 100).is_valid());
        assert!(!bar(0.0, 100).is_valid());
        assert!(!bar(1.5, -1).is_valid());
    }

    #[test]
    fn display_name_skips_redundant_name() {
        assert_eq!(WatchItem::new("IBM", "IBM").display_name(), "IBM");
        assert_eq!(
            WatchItem::new("MSFT", "Microsoft").display_name(),
            "MSFT - Microsoft"
        );
    }
}
