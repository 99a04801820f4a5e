use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub chart: ChartConfig,
}

/// Quote provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts on transport failures only. Rate-limit replies are never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

/// Stale-data policy for the reconciler
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_window_days")]
    pub window_days: usize,

    #[serde(default = "default_sufficiency_ratio")]
    pub sufficiency_ratio: f64,

    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
}

/// Chart projection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChartConfig {
    #[serde(default = "default_label_budget")]
    pub label_budget: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.alphavantage.co/query".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> usize {
    1
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    concat!("stockwatch/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/stockwatch.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_retention_days() -> i64 {
    365
}
fn default_window_days() -> usize {
    30
}
fn default_sufficiency_ratio() -> f64 {
    0.5
}
fn default_stale_after_days() -> i64 {
    1
}
fn default_inter_call_delay_ms() -> u64 {
    1500
}
fn default_label_budget() -> usize {
    15
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
            retention_days: default_retention_days(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            sufficiency_ratio: default_sufficiency_ratio(),
            stale_after_days: default_stale_after_days(),
            inter_call_delay_ms: default_inter_call_delay_ms(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self { label_budget: default_label_budget() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            reconcile: ReconcileConfig::default(),
            chart: ChartConfig::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }

    /// Minimum stored bar count for a window to count as sufficient.
    pub fn sufficiency_threshold(&self, window_days: usize) -> usize {
        (window_days as f64 * self.sufficiency_ratio).floor() as usize
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> crate::Result<Self> {
        dotenv::dotenv().ok();

        let built = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("STOCKWATCH").separator("__"))
            .build()
            .map_err(|e| crate::Error::InvalidArgument(format!("config: {}", e)))?;

        let app_cfg = built.try_deserialize().unwrap_or_else(|e| {
            warn!("Ignoring malformed configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
