//! Stock watch-list core: keeps daily history for followed symbols fresh
//! against a rate-limited quote provider, and derives chart and ranking
//! views from the local store.

pub mod chart;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod quotes;
pub mod ranking;
pub mod reconcile;
pub mod storage;
pub mod utils;
pub mod watchlist;

pub use error::{Error, Result};
