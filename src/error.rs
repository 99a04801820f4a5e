use thiserror::Error;

/// Library-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("network failure: {0}")]
    Network(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("no data for symbol {0}")]
    NotFound(String),

    #[error("store failure: {0}")]
    Store(#[from] duckdb::Error),

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Decode(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl Error {
    /// True for failures that mean "the provider had nothing for us right now".
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Error::RateLimited(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
