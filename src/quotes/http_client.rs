use crate::config::ApiConfig;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: usize,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            inner,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Fetch a URL as text. Transport failures are retried on a fixed interval;
    /// throttling statuses surface as `RateLimited` straight away.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let strategy = FixedInterval::new(self.retry_delay).take(self.max_retries);

        RetryIf::spawn(
            strategy,
            || self.get_once(url),
            |e: &Error| {
                let retry = matches!(e, Error::Network(_));
                if retry {
                    warn!("Transport failure, retrying: {}", e);
                }
                retry
            },
        )
        .await
    }

    async fn get_once(&self, url: &str) -> Result<String> {
        debug!("GET {}", redact(url));

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(Error::RateLimited(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Error::Network(format!("HTTP error {}", status)));
        }

        Ok(resp.text().await?)
    }
}

/// Strip the api key before a URL reaches the logs.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if k == "apikey" { "***".to_string() } else { v.into_owned() };
                    (k.into_owned(), v)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every request with `status` and `body`, counting requests.
    async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        (format!("http://{}/query?function=GLOBAL_QUOTE", addr), hits)
    }

    fn client(max_retries: usize) -> HttpClient {
        HttpClient::new(&ApiConfig {
            max_retries,
            retry_delay_ms: 0,
            timeout_secs: 5,
            ..ApiConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited_and_not_retried() {
        let (url, hits) = serve("429 Too Many Requests", "").await;
        let err = client(2).get_text(&url).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)), "{:?}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn service_unavailable_is_rate_limited() {
        let (url, hits) = serve("503 Service Unavailable", "").await;
        let err = client(2).get_text(&url).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)), "{:?}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_as_network_failures() {
        let (url, hits) = serve("500 Internal Server Error", "").await;
        let err = client(2).get_text(&url).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)), "{:?}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn success_returns_the_body() {
        let (url, hits) = serve("200 OK", "{}").await;
        assert_eq!(client(2).get_text(&url).await.unwrap(), "{}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn redact_hides_api_key() {
        let out = redact("https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol=IBM&apikey=SECRET");
        assert!(!out.contains("SECRET"));
        assert!(out.contains("apikey=***") || out.contains("apikey=%2A%2A%2A"));
        assert!(out.contains("symbol=IBM"));
    }
}
