//! CSV dumps: the ranking snapshot of the favorites, and one symbol's quote
//! with its daily history.

use crate::error::Result;
use crate::models::{Bar, Quote, WatchItem};
use crate::storage::Repository;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportRow {
    pub rank: usize,
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change_amount: f64,
    pub change_pct: f64,
    pub volume: i64,
    #[serde(serialize_with = "ser_timestamp")]
    pub last_updated: NaiveDateTime,
}

fn ser_timestamp<S: serde::Serializer>(ts: &NaiveDateTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Rows ordered by percent change, best first. Price and volume come from the
/// latest stored bar; a symbol without bars exports zeros.
pub fn build_rows(items: &[WatchItem], latest: &HashMap<String, Bar>, now: NaiveDateTime) -> Vec<ExportRow> {
    let mut sorted: Vec<&WatchItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        let (ca, cb) = (a.change_pct.unwrap_or(0.0), b.change_pct.unwrap_or(0.0));
        cb.total_cmp(&ca).then_with(|| a.symbol.cmp(&b.symbol))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let bar = latest.get(&item.symbol);
            let price = bar.map(|b| b.close).unwrap_or(0.0);
            let change_pct = item.change_pct.unwrap_or(0.0);
            ExportRow {
                rank: i + 1,
                symbol: item.symbol.clone(),
                name: item.name.clone(),
                price,
                change_amount: price * change_pct / 100.0,
                change_pct,
                volume: bar.map(|b| b.volume).unwrap_or(0),
                last_updated: now,
            }
        })
        .collect()
}

pub fn write_csv(rows: &[ExportRow], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Exported {} rows to {:?}", rows.len(), path);
    Ok(())
}

/// Look up the latest bar of every item and write the ranking snapshot.
pub fn export_ranking_csv(repo: &Repository, items: &[WatchItem], path: &Path) -> Result<usize> {
    let mut latest = HashMap::new();
    for item in items {
        if let Some(bar) = repo.latest_bar(&item.symbol)? {
            latest.insert(item.symbol.clone(), bar);
        }
    }
    let rows = build_rows(items, &latest, Local::now().naive_local());
    write_csv(&rows, path)?;
    Ok(rows.len())
}

// ── Single symbol ─────────────────────────────────────────────────────────────

const QUOTE_HEADER: [&str; 7] = [
    "symbol",
    "name",
    "price",
    "change_pct",
    "volume",
    "latest_trading_day",
    "updated_at",
];
const HISTORY_HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

#[derive(Serialize)]
struct QuoteRow<'a> {
    symbol: &'a str,
    name: &'a str,
    price: f64,
    change_pct: f64,
    volume: i64,
    latest_trading_day: Option<NaiveDate>,
    #[serde(serialize_with = "ser_timestamp")]
    updated_at: NaiveDateTime,
}

#[derive(Serialize)]
struct HistoryRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

/// Quote block followed by the history block, bars in date order.
pub fn export_history_csv(quote: &Quote, bars: &[Bar], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    writer.write_record(QUOTE_HEADER)?;
    writer.serialize(QuoteRow {
        symbol: &quote.symbol,
        name: &quote.name,
        price: quote.price,
        change_pct: quote.change_pct,
        volume: quote.volume,
        latest_trading_day: quote.latest_trading_day,
        updated_at: quote.updated_at,
    })?;

    let mut sorted: Vec<&Bar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.date);

    writer.write_record(HISTORY_HEADER)?;
    for bar in sorted {
        writer.serialize(HistoryRow {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })?;
    }
    writer.flush()?;
    info!("Exported {} history rows for {} to {:?}", bars.len(), quote.symbol, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HistoryStore;

    fn item(symbol: &str, change: Option<f64>) -> WatchItem {
        WatchItem {
            change_pct: change,
            ..WatchItem::new(symbol, format!("{} Inc, Class A", symbol))
        }
    }

    fn bar(symbol: &str, close: f64, volume: i64) -> Bar {
        Bar {
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 2).unwrap().and_hms_opt(9, 30, 0).unwrap()
    }

    #[test]
    fn rows_are_ranked_and_priced() {
        let items = vec![item("IBM", Some(-1.0)), item("AAPL", Some(2.0)), item("NEW", None)];
        let mut latest = HashMap::new();
        latest.insert("AAPL".to_string(), bar("AAPL", 200.0, 10));
        latest.insert("IBM".to_string(), bar("IBM", 150.0, 20));

        let rows = build_rows(&items, &latest, now());
        let order: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["AAPL", "NEW", "IBM"]);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].change_amount, 4.0);
        assert_eq!(rows[2].change_amount, -1.5);
        assert_eq!(rows[1].price, 0.0);
    }

    #[test]
    fn csv_quotes_names_with_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/ranking.csv");
        let rows = build_rows(&[item("AAPL", Some(2.0))], &HashMap::new(), now());
        write_csv(&rows, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "rank,symbol,name,price,change_amount,change_pct,volume,last_updated"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1,AAPL,\"AAPL Inc, Class A\",0.0,0.0,2.0,0,2024-03-02 09:30:00"
        );
    }

    #[test]
    fn history_export_has_quote_then_dated_bars() {
        let quote = Quote {
            symbol: "IBM".into(),
            name: "IBM".into(),
            price: 190.5,
            change_pct: -0.25,
            volume: 3_000,
            open: 191.0,
            high: 192.0,
            low: 189.0,
            close: 190.5,
            latest_trading_day: NaiveDate::from_ymd_opt(2024, 3, 1),
            updated_at: now(),
        };
        let mut later = bar("IBM", 190.5, 3_000);
        later.date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let bars = vec![later, bar("IBM", 188.0, 2_000)];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ibm.csv");
        export_history_csv(&quote, &bars, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "symbol,name,price,change_pct,volume,latest_trading_day,updated_at");
        assert_eq!(lines[1], "IBM,IBM,190.5,-0.25,3000,2024-03-01,2024-03-02 09:30:00");
        assert_eq!(lines[2], "date,open,high,low,close,volume");
        assert_eq!(lines[3], "2024-03-01,188.0,188.0,188.0,188.0,2000");
        assert_eq!(lines[4], "2024-03-04,190.5,190.5,190.5,190.5,3000");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn export_reads_latest_bars_from_store() {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo.insert_if_absent(&bar("AAPL", 200.0, 10)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranking.csv");
        let n = export_ranking_csv(&repo, &[item("AAPL", Some(1.0))], &path).unwrap();
        assert_eq!(n, 1);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[3], "200.0");
        assert_eq!(&record[6], "10");
    }
}
