use anyhow::{Context, Result, bail};
use chrono::{Duration, Local};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use stockwatch::chart;
use stockwatch::config::AppConfig;
use stockwatch::export;
use stockwatch::models::WatchItem;
use stockwatch::quotes::cleaner::normalise_symbol;
use stockwatch::quotes::AlphaVantageClient;
use stockwatch::ranking;
use stockwatch::reconcile;
use stockwatch::storage::{HistoryStore, Repository};
use stockwatch::utils::{self, fmt_change, fmt_number, fmt_price};
use stockwatch::watchlist::{self, RecentList, Session};

#[derive(Parser)]
#[command(name = "stockwatch", about = "Stock watch-list with a local daily-bar cache", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Account used by favorite, sync, chart, rank and export
    #[arg(long, env = "STOCKWATCH_USER", global = true)]
    user: Option<String>,

    #[arg(long, env = "STOCKWATCH_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply schema migrations
    Migrate,

    /// Create an account from --user / --password
    Register,

    /// Quote a symbol, refresh its history and remember it as recently viewed
    Lookup {
        symbol: String,

        /// History window in trading days (default from config)
        #[arg(short, long)]
        days: Option<usize>,

        /// Also write the quote and its history to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Manage the favorites list
    Favorite {
        #[command(subcommand)]
        action: FavoriteAction,
    },

    /// Show recently viewed symbols
    Recent {
        /// Drop a symbol from the list instead
        #[arg(long)]
        forget: Option<String>,
    },

    /// Bring stored history of every favorite up to date
    Sync {
        #[arg(short, long)]
        days: Option<usize>,
    },

    /// Print aligned close-price series for the favorites
    Chart {
        #[arg(short, long)]
        days: Option<usize>,
    },

    /// Refresh favorite quotes and print top gainers and losers
    Rank,

    /// Write the ranking snapshot to a CSV file
    Export {
        #[arg(short, long, default_value = "data/ranking.csv")]
        out: PathBuf,
    },

    /// Delete bars older than the configured retention
    Prune,

    /// Show database statistics
    Stats,
}

#[derive(Subcommand)]
enum FavoriteAction {
    Add { symbol: String },
    Remove { symbol: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "stockwatch=info,warn",
        1 => "stockwatch=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;
    let today = Local::now().date_naive();

    match cli.command {
        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Register => {
            let repo = open_repo(&config)?;
            let (user, password) = credentials(&cli.user, &cli.password)?;
            watchlist::register(&repo, user, password)?;
            println!("Registered {}.", user);
        }

        Command::Lookup { symbol, days, export: export_path } => {
            let repo = open_repo(&config)?;
            let client = AlphaVantageClient::new(&config.api)?;
            let window = days.unwrap_or(config.reconcile.window_days);

            let Some(found) = watchlist::lookup(&repo, &client, &config.reconcile, &symbol, window, today)
                .await
                .context("lookup failed")?
            else {
                println!("No data for {} right now.", normalise_symbol(&symbol));
                return Ok(());
            };

            let q = &found.quote;
            println!(
                "{}  {}  {}  vol {}",
                q.symbol,
                fmt_price(Some(q.price)),
                fmt_change(Some(q.change_pct)),
                fmt_number(q.volume)
            );
            println!("History: {:?}, {} bars", found.outcome, found.bars.len());
            println!(
                "  {:<10} {:>10} {:>10} {:>10} {:>10} {:>15}",
                "date", "open", "high", "low", "close", "volume"
            );
            for b in &found.bars {
                println!(
                    "  {:<10} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>15}",
                    b.date,
                    b.open,
                    b.high,
                    b.low,
                    b.close,
                    fmt_number(b.volume)
                );
            }

            if let Some(out) = export_path {
                export::export_history_csv(q, &found.bars, &out)
                    .with_context(|| format!("exporting to {:?}", out))?;
                println!("Wrote {} to {}", q.symbol, out.display());
            }
        }

        Command::Favorite { action } => {
            let repo = open_repo(&config)?;
            let session = login(&repo, &cli.user, &cli.password)?;
            match action {
                FavoriteAction::Add { symbol } => {
                    let symbol = normalise_symbol(&symbol);
                    // carry over what the recent list already knows about the symbol
                    let item = RecentList::load(&repo)?
                        .iter()
                        .find(|i| i.symbol == symbol)
                        .cloned()
                        .unwrap_or_else(|| WatchItem::new(symbol.clone(), ""));
                    if watchlist::add_favorite(&repo, &session, &item)? {
                        println!("Added {} to favorites.", item.display_name());
                    } else {
                        println!("{} is already a favorite.", symbol);
                    }
                }
                FavoriteAction::Remove { symbol } => {
                    if watchlist::remove_favorite(&repo, &session, &symbol)? {
                        println!("Removed {}.", normalise_symbol(&symbol));
                    } else {
                        println!("{} was not a favorite.", normalise_symbol(&symbol));
                    }
                }
                FavoriteAction::List => print_items(&watchlist::favorites(&repo, &session)?),
            }
        }

        Command::Recent { forget } => {
            let repo = open_repo(&config)?;
            let mut recent = RecentList::load(&repo)?;
            if let Some(symbol) = forget {
                if recent.remove(&normalise_symbol(&symbol)) {
                    recent.save(&repo)?;
                }
            }
            if recent.is_empty() {
                println!("Nothing viewed yet; try `stockwatch lookup IBM`.");
            } else {
                print_items(&recent.to_vec());
            }
        }

        Command::Sync { days } => {
            let _t = utils::Timer::start("Favorites sync");
            let repo = open_repo(&config)?;
            let session = login(&repo, &cli.user, &cli.password)?;
            let client = AlphaVantageClient::new(&config.api)?;
            let window = days.unwrap_or(config.reconcile.window_days);

            let report =
                reconcile::sync_favorites(&repo, &client, &session, &config.reconcile, window, today).await?;
            if report.is_no_data() {
                println!("No data available for any favorite (provider limit reached?).");
            }
            println!(
                "{} symbols | {} fetched | {} saved | {} failed | {} bars inserted | {} requests",
                report.symbols.len(),
                report.fetched(),
                report.saved(),
                report.failed(),
                report.bars_inserted(),
                report.network_calls
            );
        }

        Command::Chart { days } => {
            let repo = open_repo(&config)?;
            let session = login(&repo, &cli.user, &cli.password)?;
            let client = AlphaVantageClient::new(&config.api)?;
            let window = days.unwrap_or(config.reconcile.window_days);

            let report =
                reconcile::sync_favorites(&repo, &client, &session, &config.reconcile, window, today).await?;
            if report.is_no_data() {
                println!("No data to chart.");
                return Ok(());
            }

            let input = report.chart_input();
            let projection = chart::project(&input);
            let labels = chart::axis_labels(&projection.date_axis, config.chart.label_budget);

            print!("{:>8}", "");
            for s in &projection.series {
                print!("{:>10}", s.symbol);
            }
            println!();
            for (i, label) in labels.iter().enumerate() {
                print!("{:>8}", label);
                for s in &projection.series {
                    print!("{:>10}", fmt_price(s.values[i]));
                }
                println!();
            }

            println!();
            println!("Latest volume:");
            for (symbol, volume) in chart::latest_volumes(&input) {
                println!("  {:<8} {:>15}", symbol, fmt_number(volume));
            }
        }

        Command::Rank => {
            let repo = open_repo(&config)?;
            let session = login(&repo, &cli.user, &cli.password)?;
            let client = AlphaVantageClient::new(&config.api)?;

            let items =
                watchlist::refresh_quotes(&repo, &client, &session, config.reconcile.inter_call_delay()).await?;
            let ranking = ranking::rank(&items);

            println!("Top gainers");
            print_items(&ranking.gainers);
            println!("Top losers");
            print_items(&ranking.losers);
        }

        Command::Export { out } => {
            let repo = open_repo(&config)?;
            let session = login(&repo, &cli.user, &cli.password)?;
            let items = watchlist::favorites(&repo, &session)?;
            let n = export::export_ranking_csv(&repo, &items, &out)
                .with_context(|| format!("exporting to {:?}", out))?;
            println!("Wrote {} rows to {}", n, out.display());
        }

        Command::Prune => {
            let repo = open_repo(&config)?;
            let cutoff = today - Duration::days(config.storage.retention_days);
            let removed = repo.delete_older_than(cutoff)?;
            info!("Pruned {} bars dated before {}", removed, cutoff);
            println!("Removed {} bars older than {}.", fmt_number(removed as i64), cutoff);
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let bars = repo.bar_count()?;
            let symbols = repo.symbol_count()?;
            let (min, max) = repo.date_range().unwrap_or((None, None));
            let last_sync = repo.last_sync_run().unwrap_or(None);
            println!("─────────────────────────────────");
            println!("  stockwatch — Database Stats");
            println!("─────────────────────────────────");
            println!("  Symbols   : {}", fmt_number(symbols));
            println!("  Daily bars: {}", fmt_number(bars));
            println!("  From      : {}", min.map(|d| d.to_string()).unwrap_or("—".into()));
            println!("  To        : {}", max.map(|d| d.to_string()).unwrap_or("—".into()));
            println!(
                "  Last sync : {}",
                last_sync.map(|(id, status)| format!("#{} {}", id, status)).unwrap_or("—".into())
            );
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)
        .with_context(|| format!("opening {:?}", config.storage.db_path))?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn credentials<'a>(user: &'a Option<String>, password: &'a Option<String>) -> Result<(&'a str, &'a str)> {
    match (user.as_deref(), password.as_deref()) {
        (Some(u), Some(p)) => Ok((u, p)),
        _ => bail!("--user and --password (or STOCKWATCH_USER / STOCKWATCH_PASSWORD) are required"),
    }
}

fn login(repo: &Repository, user: &Option<String>, password: &Option<String>) -> Result<Session> {
    let (u, p) = credentials(user, password)?;
    watchlist::login(repo, u, p).context("login failed")
}

fn print_items(items: &[WatchItem]) {
    if items.is_empty() {
        println!("  (none)");
        return;
    }
    for item in items {
        println!(
            "  {:<30} {:>10} {:>9}",
            item.display_name(),
            fmt_price(item.price),
            fmt_change(item.change_pct)
        );
    }
}
