use crate::error::Result;
use crate::models::{Bar, WatchItem};
use chrono::{Local, NaiveDate};
use duckdb::{Connection, OptionalExt, params};
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS daily_bars (
    symbol      VARCHAR  NOT NULL,
    date        DATE     NOT NULL,
    open        DOUBLE   NOT NULL,
    high        DOUBLE   NOT NULL,
    low         DOUBLE   NOT NULL,
    close       DOUBLE   NOT NULL,
    volume      BIGINT   NOT NULL,
    created_at  TIMESTAMP NOT NULL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS users (
    username      VARCHAR PRIMARY KEY,
    password_hash VARCHAR NOT NULL,
    created_at    TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS favorites (
    username    VARCHAR NOT NULL,
    symbol      VARCHAR NOT NULL,
    name        VARCHAR NOT NULL DEFAULT '',
    price       DOUBLE,
    change_pct  DOUBLE,
    updated_at  TIMESTAMP,
    added_at    TIMESTAMP NOT NULL,
    PRIMARY KEY (username, symbol)
);

CREATE TABLE IF NOT EXISTS recent_items (
    position    INTEGER NOT NULL,
    symbol      VARCHAR NOT NULL,
    name        VARCHAR NOT NULL DEFAULT '',
    price       DOUBLE,
    change_pct  DOUBLE
);

CREATE SEQUENCE IF NOT EXISTS sync_run_seq START 1;

CREATE TABLE IF NOT EXISTS sync_runs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('sync_run_seq'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    symbols_processed   INTEGER DEFAULT 0,
    bars_inserted       INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_bars_date   ON daily_bars (date);
CREATE INDEX IF NOT EXISTS idx_bars_symbol ON daily_bars (symbol);
"#;

// ── Store trait ───────────────────────────────────────────────────────────────

/// Keyed (symbol, date) → bar storage used by the reconciler.
pub trait HistoryStore {
    /// Insert unless a bar for (symbol, date) exists. Returns whether a row was written.
    fn insert_if_absent(&self, bar: &Bar) -> Result<bool>;

    /// The `window` most recent bars for `symbol`, ordered by date ascending.
    fn read_range(&self, symbol: &str, window: usize) -> Result<Vec<Bar>>;

    /// Delete every bar dated before `cutoff`. Returns the number removed.
    fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize>;
}

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB-backed store. Every operation works on its own cloned connection,
/// released when the operation returns.
pub struct Repository {
    root: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let root = Connection::open(path)?;
        debug!("Opened DuckDB at {:?}", path);
        Ok(Self { root })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { root: Connection::open_in_memory()? })
    }

    fn conn(&self) -> Result<Connection> {
        Ok(self.root.try_clone()?)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn()?;
        conn.execute_batch(DDL)?;
        conn.execute_batch(INDEXES)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Local::now().naive_local()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Daily bars ────────────────────────────────────────────────────────────

    /// Most recent bar per symbol, used for prices/volumes in ranking exports.
    pub fn latest_bar(&self, symbol: &str) -> Result<Option<Bar>> {
        Ok(self.read_range(symbol, 1)?.pop())
    }

    pub fn bar_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM daily_bars", [], |r| r.get(0))?)
    }

    pub fn symbol_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(DISTINCT symbol) FROM daily_bars", [], |r| r.get(0))?)
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT MIN(date), MAX(date) FROM daily_bars", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })?)
    }

    // ── Users ─────────────────────────────────────────────────────────────────

    /// Returns false when the username is already taken.
    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?",
            params![username],
            |r| r.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
            params![username, password_hash, Local::now().naive_local()],
        )?;
        Ok(true)
    }

    pub fn password_hash(&self, username: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?",
                params![username],
                |r| r.get(0),
            )
            .optional()?)
    }

    // ── Favorites ─────────────────────────────────────────────────────────────

    /// Returns false when the symbol is already a favorite of this user.
    pub fn insert_favorite(&self, username: &str, item: &WatchItem) -> Result<bool> {
        let conn = self.conn()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM favorites WHERE username = ? AND symbol = ?",
            params![username, item.symbol],
            |r| r.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }
        conn.execute(
            r#"INSERT INTO favorites (username, symbol, name, price, change_pct, added_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                username,
                item.symbol,
                item.name,
                item.price,
                item.change_pct,
                Local::now().naive_local(),
            ],
        )?;
        Ok(true)
    }

    pub fn remove_favorite(&self, username: &str, symbol: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM favorites WHERE username = ? AND symbol = ?",
            params![username, symbol],
        )?;
        Ok(n > 0)
    }

    /// Favorites in the order they were added.
    pub fn favorites(&self, username: &str) -> Result<Vec<WatchItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT symbol, name, price, change_pct FROM favorites
               WHERE username = ? ORDER BY added_at, symbol"#,
        )?;
        let items = stmt
            .query_map(params![username], |r| {
                Ok(WatchItem {
                    symbol: r.get(0)?,
                    name: r.get(1)?,
                    price: r.get(2)?,
                    change_pct: r.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_favorite_quote(
        &self,
        username: &str,
        symbol: &str,
        price: f64,
        change_pct: f64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            r#"UPDATE favorites SET price = ?, change_pct = ?, updated_at = ?
               WHERE username = ? AND symbol = ?"#,
            params![price, change_pct, Local::now().naive_local(), username, symbol],
        )?;
        Ok(n > 0)
    }

    // ── Recently viewed ───────────────────────────────────────────────────────

    /// Newest first.
    pub fn recent_items(&self) -> Result<Vec<WatchItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, name, price, change_pct FROM recent_items ORDER BY position",
        )?;
        let items = stmt
            .query_map([], |r| {
                Ok(WatchItem {
                    symbol: r.get(0)?,
                    name: r.get(1)?,
                    price: r.get(2)?,
                    change_pct: r.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Replace the stored recent list with `items` (newest first).
    pub fn save_recent_items(&self, items: &[WatchItem]) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM recent_items", [])?;
        for (pos, item) in items.iter().enumerate() {
            tx.execute(
                r#"INSERT INTO recent_items (position, symbol, name, price, change_pct)
                   VALUES (?, ?, ?, ?, ?)"#,
                params![pos as i64, item.symbol, item.name, item.price, item.change_pct],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Sync run log ──────────────────────────────────────────────────────────

    pub fn begin_sync_run(&self) -> Result<i64> {
        let conn = self.conn()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sync_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Local::now().naive_local()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_sync_run(
        &self,
        run_id: i64,
        symbols: usize,
        bars: usize,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"UPDATE sync_runs SET
               finished_at = ?, status = ?,
               symbols_processed = ?, bars_inserted = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Local::now().naive_local(),
                if error.is_none() { "success" } else { "partial" },
                symbols as i64,
                bars as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_sync_run(&self) -> Result<Option<(i64, String)>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, status FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?)
    }
}

impl HistoryStore for Repository {
    fn insert_if_absent(&self, bar: &Bar) -> Result<bool> {
        let conn = self.conn()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM daily_bars WHERE symbol = ? AND date = ?",
            params![bar.symbol, bar.date],
            |r| r.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }

        conn.execute(
            r#"INSERT INTO daily_bars (symbol, date, open, high, low, close, volume, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                bar.symbol,
                bar.date,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume,
                Local::now().naive_local(),
            ],
        )?;
        Ok(true)
    }

    fn read_range(&self, symbol: &str, window: usize) -> Result<Vec<Bar>> {
        let conn = self.conn()?;
        // window is a usize, formatting it into the statement is safe
        let sql = format!(
            r#"SELECT symbol, date, open, high, low, close, volume FROM (
                   SELECT * FROM daily_bars WHERE symbol = ?
                   ORDER BY date DESC LIMIT {}
               ) ORDER BY date ASC"#,
            window
        );
        let mut stmt = conn.prepare(&sql)?;
        let bars = stmt
            .query_map(params![symbol], |r| {
                Ok(Bar {
                    symbol: r.get(0)?,
                    date: r.get(1)?,
                    open: r.get(2)?,
                    high: r.get(3)?,
                    low: r.get(4)?,
                    close: r.get(5)?,
                    volume: r.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bars)
    }

    fn delete_older_than(&self, cutoff: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM daily_bars WHERE date < ?", params![cutoff])?;
        info!("Retention sweep removed {} bars older than {}", n, cutoff);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn bar(symbol: &str, date: NaiveDate, close: f64) -> Bar {
        Bar {
            symbol: symbol.into(),
            date,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
        }
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(n as i64)
    }

    #[test]
    fn migrations_are_rerunnable() {
        let repo = repo();
        repo.run_migrations().unwrap();
        assert_eq!(repo.bar_count().unwrap(), 0);
    }

    #[test]
    fn insert_if_absent_never_overwrites() {
        let repo = repo();
        assert!(repo.insert_if_absent(&bar("AAPL", day(0), 100.0)).unwrap());
        assert!(!repo.insert_if_absent(&bar("AAPL", day(0), 555.0)).unwrap());
        assert!(repo.insert_if_absent(&bar("MSFT", day(0), 300.0)).unwrap());

        let stored = repo.read_range("AAPL", 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].close, 100.0);
        assert_eq!(repo.bar_count().unwrap(), 2);
    }

    #[test]
    fn read_range_returns_latest_window_ascending() {
        let repo = repo();
        for n in [4, 0, 2, 1, 3] {
            repo.insert_if_absent(&bar("IBM", day(n), 10.0 + n as f64)).unwrap();
        }
        let bars = repo.read_range("IBM", 3).unwrap();
        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![day(2), day(3), day(4)]);
        assert_eq!(repo.latest_bar("IBM").unwrap().unwrap().date, day(4));
        assert!(repo.read_range("NOPE", 3).unwrap().is_empty());
    }

    #[test]
    fn retention_sweep_deletes_only_older_bars() {
        let repo = repo();
        for n in 0..5 {
            repo.insert_if_absent(&bar("IBM", day(n), 10.0)).unwrap();
        }
        assert_eq!(repo.delete_older_than(day(3)).unwrap(), 3);
        assert_eq!(repo.date_range().unwrap(), (Some(day(3)), Some(day(4))));
    }

    #[test]
    fn users_are_unique() {
        let repo = repo();
        assert!(repo.insert_user("alice", "hash-1").unwrap());
        assert!(!repo.insert_user("alice", "hash-2").unwrap());
        assert_eq!(repo.password_hash("alice").unwrap().as_deref(), Some("hash-1"));
        assert_eq!(repo.password_hash("bob").unwrap(), None);
    }

    #[test]
    fn favorites_are_per_user() {
        let repo = repo();
        let item = WatchItem::new("AAPL", "Apple");
        assert!(repo.insert_favorite("alice", &item).unwrap());
        assert!(!repo.insert_favorite("alice", &item).unwrap());
        assert!(repo.insert_favorite("bob", &item).unwrap());

        assert!(repo.update_favorite_quote("alice", "AAPL", 190.0, -1.25).unwrap());
        let favs = repo.favorites("alice").unwrap();
        assert_eq!(favs.len(), 1);
        assert_eq!(favs[0].change_pct, Some(-1.25));
        assert_eq!(repo.favorites("bob").unwrap()[0].change_pct, None);

        assert!(repo.remove_favorite("alice", "AAPL").unwrap());
        assert!(!repo.remove_favorite("alice", "AAPL").unwrap());
        assert!(repo.favorites("alice").unwrap().is_empty());
    }

    #[test]
    fn recent_items_round_trip_in_order() {
        let repo = repo();
        let items = vec![WatchItem::new("TSLA", "Tesla"), WatchItem::new("IBM", "IBM")];
        repo.save_recent_items(&items).unwrap();
        repo.save_recent_items(&items).unwrap();
        assert_eq!(repo.recent_items().unwrap(), items);
    }

    #[test]
    fn sync_run_log() {
        let repo = repo();
        let id = repo.begin_sync_run().unwrap();
        repo.finish_sync_run(id, 3, 42, None).unwrap();
        assert_eq!(repo.last_sync_run().unwrap(), Some((id, "success".to_string())));
    }
}
