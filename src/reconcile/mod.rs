//! Reconciler: keeps stored history for followed symbols fresh.
//!
//! For every symbol, independently:
//!   1. read the stored window (most recent `window_days` bars)
//!   2. enough bars AND latest one recent enough → use the cache, no request
//!   3. otherwise ask the quote source for `window_days` bars and insert the
//!      ones the store does not have yet (skip-if-exists on (symbol, date))
//!   4. re-read the window from the store; that read is what callers get
//!
//! Requests go out one at a time with a fixed pause between them. A throttled
//! or empty reply is "no data this run", never retried inside the run, and no
//! per-symbol failure aborts the batch.

use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::models::Bar;
use crate::quotes::QuoteSource;
use crate::quotes::cleaner::normalise_symbol;
use crate::storage::{HistoryStore, Repository};
use crate::watchlist::{self, Session};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error, info, warn};

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport failure or a payload we could not decode.
    Network,
    /// A write into the history store failed.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    UsedCache(usize),
    FetchEmpty,
    Fetched { inserted: usize, skipped: usize },
    Failed(FailureKind),
}

/// Why the cached window was (not) good enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Usable,
    Insufficient { have: usize, need: usize },
    Stale { latest: Option<NaiveDate> },
}

#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: String,
    pub outcome: Outcome,
    /// Re-read from the store after reconciliation, date ascending.
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub symbols: Vec<SymbolReport>,
    pub network_calls: usize,
}

impl ReconcileReport {
    /// Symbols for which the provider returned bars.
    pub fn fetched(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Fetched { .. } | Outcome::Failed(FailureKind::Store)))
    }

    /// Symbols whose fetched bars were all written (or already present).
    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Fetched { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn bars_inserted(&self) -> usize {
        self.symbols
            .iter()
            .map(|s| match s.outcome {
                Outcome::Fetched { inserted, .. } => inserted,
                _ => 0,
            })
            .sum()
    }

    /// Symbols with at least one stored bar to show.
    pub fn with_data(&self) -> usize {
        self.symbols.iter().filter(|s| !s.bars.is_empty()).count()
    }

    /// The whole batch produced nothing displayable.
    pub fn is_no_data(&self) -> bool {
        self.with_data() == 0
    }

    /// Per-symbol bars keyed by symbol, skipping symbols without data.
    pub fn chart_input(&self) -> BTreeMap<String, Vec<Bar>> {
        self.symbols
            .iter()
            .filter(|s| !s.bars.is_empty())
            .map(|s| (s.symbol.clone(), s.bars.clone()))
            .collect()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.symbols.iter().filter(|s| pred(&s.outcome)).count()
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// Judge a stored window (date ascending) against the sufficiency and staleness rules.
pub fn assess(cached: &[Bar], window_days: usize, today: NaiveDate, cfg: &ReconcileConfig) -> CacheState {
    let need = cfg.sufficiency_threshold(window_days);
    if cached.len() < need {
        return CacheState::Insufficient { have: cached.len(), need };
    }

    let latest = cached.iter().map(|b| b.date).max();
    match latest {
        Some(d) if (today - d).num_days() <= cfg.stale_after_days => CacheState::Usable,
        _ => CacheState::Stale { latest },
    }
}

// ── Reconciler ────────────────────────────────────────────────────────────────

pub struct Reconciler<'a> {
    source: &'a dyn QuoteSource,
    store: &'a dyn HistoryStore,
    config: ReconcileConfig,
    calls_before: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(source: &'a dyn QuoteSource, store: &'a dyn HistoryStore, config: ReconcileConfig) -> Self {
        Self { source, store, config, calls_before: 0 }
    }

    /// Count requests the caller already sent to the same provider, so the
    /// first fetch of the run is paced as well.
    pub fn after_calls(mut self, calls: usize) -> Self {
        self.calls_before = calls;
        self
    }

    pub async fn reconcile(&self, symbols: &[String], window_days: usize, today: NaiveDate) -> ReconcileReport {
        let window = window_days.max(1);
        let mut report = ReconcileReport::default();
        let mut seen = HashSet::new();

        info!("Reconciling {} symbols (window {} days)", symbols.len(), window);

        for raw in symbols {
            let symbol = normalise_symbol(raw);
            if symbol.is_empty() || !seen.insert(symbol.clone()) {
                continue;
            }

            let cached = self.store.read_range(&symbol, window).unwrap_or_else(|e| {
                warn!("{}: reading stored bars failed, treating as empty: {}", symbol, e);
                Vec::new()
            });

            let outcome = match assess(&cached, window, today, &self.config) {
                CacheState::Usable => {
                    debug!("{}: {} cached bars are fresh", symbol, cached.len());
                    Outcome::UsedCache(cached.len())
                }
                state => {
                    debug!("{}: fetching ({:?})", symbol, state);
                    if report.network_calls + self.calls_before > 0 {
                        tokio::time::sleep(self.config.inter_call_delay()).await;
                    }
                    report.network_calls += 1;
                    self.fetch_and_store(&symbol, window).await
                }
            };

            let bars = self.store.read_range(&symbol, window).unwrap_or_else(|e| {
                error!("{}: re-reading stored bars failed: {}", symbol, e);
                Vec::new()
            });

            info!("{}: {:?}, {} bars available", symbol, outcome, bars.len());
            report.symbols.push(SymbolReport { symbol, outcome, bars });
        }

        info!(
            "Reconcile done: {} fetched | {} saved | {} failed | {} with data",
            report.fetched(),
            report.saved(),
            report.failed(),
            report.with_data(),
        );
        report
    }

    async fn fetch_and_store(&self, symbol: &str, window: usize) -> Outcome {
        let bars = match self.source.fetch_daily_bars(symbol, window).await {
            Ok(bars) if bars.is_empty() => {
                warn!("{}: provider returned no bars", symbol);
                return Outcome::FetchEmpty;
            }
            Ok(bars) => bars,
            Err(e) if e.is_empty_result() => {
                warn!("{}: no data this run ({})", symbol, e);
                return Outcome::FetchEmpty;
            }
            Err(e) => {
                warn!("{}: fetch failed: {}", symbol, e);
                return Outcome::Failed(FailureKind::Network);
            }
        };

        let mut inserted = 0usize;
        let mut skipped = 0usize;

        for bar in bars {
            let bar = Bar { symbol: symbol.to_string(), ..bar };
            match self.store.insert_if_absent(&bar) {
                Ok(true) => inserted += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    error!("{}: saving bar for {} failed after {} inserts: {}", symbol, bar.date, inserted, e);
                    return Outcome::Failed(FailureKind::Store);
                }
            }
        }

        Outcome::Fetched { inserted, skipped }
    }
}

// ── Watch-list sync ───────────────────────────────────────────────────────────

/// Reconcile every favorite of `session`, recording the run in `sync_runs`.
pub async fn sync_favorites(
    repo: &Repository,
    source: &dyn QuoteSource,
    session: &Session,
    config: &ReconcileConfig,
    window_days: usize,
    today: NaiveDate,
) -> Result<ReconcileReport> {
    let symbols: Vec<String> = watchlist::favorites(repo, session)?
        .into_iter()
        .map(|f| f.symbol)
        .collect();

    let run_id = repo
        .begin_sync_run()
        .map_err(|e| warn!("Could not open a sync run, continuing unlogged: {}", e))
        .ok();
    let report = Reconciler::new(source, repo, config.clone())
        .reconcile(&symbols, window_days, today)
        .await;

    if let Some(run_id) = run_id {
        let failed = report.failed();
        let summary = (failed > 0).then(|| format!("{} symbols failed", failed));
        if let Err(e) = repo.finish_sync_run(run_id, report.symbols.len(), report.bars_inserted(), summary.as_deref()) {
            warn!("Could not close sync run {}: {}", run_id, e);
        }
    }

    Ok(report)
}
