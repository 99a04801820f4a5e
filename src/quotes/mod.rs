pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{Bar, Quote};
use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info, warn};

use self::cleaner::{daily_entry_to_bar, global_quote_to_quote, normalise_symbol};
use self::http_client::HttpClient;
use self::parsers::{parse_daily_series, parse_global_quote};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable quote provider.
///
/// Implementations report provider throttling as [`Error::RateLimited`] and
/// unknown symbols as [`Error::NotFound`]; callers decide how to degrade.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote>;

    /// Up to `limit` most recent daily bars, newest first.
    async fn fetch_daily_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>>;
}

// ── Alpha Vantage ─────────────────────────────────────────────────────────────

pub struct AlphaVantageClient {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "api.api_key is empty (set STOCKWATCH__API__API_KEY)".into(),
            ));
        }
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, function: &str, symbol: &str, extra: &[(&str, &str)]) -> Result<String> {
        let mut params = vec![
            ("function", function),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
        ];
        params.extend_from_slice(extra);
        url::Url::parse_with_params(&self.base_url, &params)
            .map(String::from)
            .map_err(|e| Error::InvalidArgument(format!("bad base_url {}: {}", self.base_url, e)))
    }
}

#[async_trait]
impl QuoteSource for AlphaVantageClient {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let symbol = normalise_symbol(symbol);
        let url = self.endpoint("GLOBAL_QUOTE", &symbol, &[])?;

        let body = self.client.get_text(&url).await?;
        let raw = parse_global_quote(&body, &symbol)?;

        let quote = global_quote_to_quote(&raw, Local::now().naive_local())
            .ok_or_else(|| Error::Decode(format!("{}: quote without a price", symbol)))?;
        debug!("{}: price {} ({:+.2}%)", quote.symbol, quote.price, quote.change_pct);
        Ok(quote)
    }

    async fn fetch_daily_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>> {
        let symbol = normalise_symbol(symbol);
        let url = self.endpoint("TIME_SERIES_DAILY", &symbol, &[("outputsize", "compact")])?;

        let body = self.client.get_text(&url).await?;
        let rows = parse_daily_series(&body, &symbol, limit)?;

        if rows.is_empty() {
            warn!("{}: provider returned an empty daily series", symbol);
        }

        let bars: Vec<Bar> = rows
            .iter()
            .filter_map(|(date, row)| daily_entry_to_bar(&symbol, date, row))
            .collect();

        info!("{}: {} daily bars from provider", symbol, bars.len());
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: &str) -> ApiConfig {
        ApiConfig {
            api_key: key.into(),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(matches!(
            AlphaVantageClient::new(&config("  ")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn endpoint_encodes_params() {
        let client = AlphaVantageClient::new(&config("KEY123")).unwrap();
        let url = client
            .endpoint("TIME_SERIES_DAILY", "BRK.B", &[("outputsize", "compact")])
            .unwrap();
        assert!(url.starts_with("https://www.alphavantage.co/query?"));
        assert!(url.contains("function=TIME_SERIES_DAILY"));
        assert!(url.contains("symbol=BRK.B"));
        assert!(url.contains("apikey=KEY123"));
        assert!(url.contains("outputsize=compact"));
    }
}
