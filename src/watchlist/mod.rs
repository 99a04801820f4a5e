//! Users, favorites and the recently-viewed list.
//!
//! Identity is an explicit [`Session`] returned by [`login`] and handed to every
//! operation that needs it; nothing here keeps a "current user" around.

use crate::config::ReconcileConfig;
use crate::error::{Error, Result};
use crate::models::{Bar, Quote, WatchItem};
use crate::quotes::QuoteSource;
use crate::quotes::cleaner::normalise_symbol;
use crate::reconcile::{Outcome, Reconciler};
use crate::storage::Repository;
use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RECENT_CAP: usize = 20;

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    username: String,
}

impl Session {
    pub fn username(&self) -> &str {
        &self.username
    }
}

pub fn register(repo: &Repository, username: &str, password: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() || password.trim().is_empty() {
        return Err(Error::InvalidArgument("username and password must not be empty".into()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Auth(format!("password hashing failed: {}", e)))?
        .to_string();

    if !repo.insert_user(username, &hash)? {
        return Err(Error::Auth(format!("username {} is already taken", username)));
    }
    info!("Registered user {}", username);
    Ok(())
}

pub fn login(repo: &Repository, username: &str, password: &str) -> Result<Session> {
    let username = username.trim();
    let Some(stored) = repo.password_hash(username)? else {
        return Err(Error::Auth("unknown user or wrong password".into()));
    };

    let parsed = PasswordHash::new(&stored)
        .map_err(|e| Error::Auth(format!("corrupt password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => {
            debug!("{} logged in", username);
            Ok(Session { username: username.to_string() })
        }
        Err(argon2::password_hash::Error::Password) => {
            Err(Error::Auth("unknown user or wrong password".into()))
        }
        Err(e) => Err(Error::Auth(format!("password verification failed: {}", e))),
    }
}

// ── Favorites ─────────────────────────────────────────────────────────────────

/// Returns false when the symbol is already a favorite.
pub fn add_favorite(repo: &Repository, session: &Session, item: &WatchItem) -> Result<bool> {
    let item = WatchItem {
        symbol: normalise_symbol(&item.symbol),
        ..item.clone()
    };
    if item.symbol.is_empty() {
        return Err(Error::InvalidArgument("empty symbol".into()));
    }
    repo.insert_favorite(session.username(), &item)
}

pub fn remove_favorite(repo: &Repository, session: &Session, symbol: &str) -> Result<bool> {
    repo.remove_favorite(session.username(), &normalise_symbol(symbol))
}

pub fn favorites(repo: &Repository, session: &Session) -> Result<Vec<WatchItem>> {
    repo.favorites(session.username())
}

/// Fetch a fresh quote for every favorite, one request at a time, and record
/// price and percent change. A failed fetch keeps the previous values.
/// Returns the favorites as they stand afterwards.
pub async fn refresh_quotes(
    repo: &Repository,
    source: &dyn QuoteSource,
    session: &Session,
    delay: Duration,
) -> Result<Vec<WatchItem>> {
    let favs = favorites(repo, session)?;
    let mut refreshed = 0usize;

    for (i, item) in favs.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match source.fetch_quote(&item.symbol).await {
            Ok(q) => {
                repo.update_favorite_quote(session.username(), &item.symbol, q.price, q.change_pct)?;
                refreshed += 1;
            }
            Err(e) if e.is_empty_result() => debug!("{}: no quote ({})", item.symbol, e),
            Err(e) => warn!("{}: quote refresh failed: {}", item.symbol, e),
        }
    }

    info!("Refreshed {}/{} favorite quotes", refreshed, favs.len());
    favorites(repo, session)
}

// ── Search ────────────────────────────────────────────────────────────────────

/// A successful search: the live quote plus the symbol's stored history.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub quote: Quote,
    pub outcome: Outcome,
    /// Date ascending, re-read from the store.
    pub bars: Vec<Bar>,
}

/// Quote `symbol`, bring its history up to date and put it at the front of the
/// recent list. `Ok(None)` when the provider has nothing for the symbol right
/// now; in that case no history request is made and the recent list is untouched.
pub async fn lookup(
    repo: &Repository,
    source: &dyn QuoteSource,
    config: &ReconcileConfig,
    symbol: &str,
    window_days: usize,
    today: NaiveDate,
) -> Result<Option<Lookup>> {
    let symbol = normalise_symbol(symbol);
    if symbol.is_empty() {
        return Err(Error::InvalidArgument("empty symbol".into()));
    }

    let quote = match source.fetch_quote(&symbol).await {
        Ok(q) => q,
        Err(e) if e.is_empty_result() => {
            info!("{}: no quote ({}), skipping history", symbol, e);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let report = Reconciler::new(source, repo, config.clone())
        .after_calls(1)
        .reconcile(std::slice::from_ref(&quote.symbol), window_days, today)
        .await;
    let (outcome, bars) = report
        .symbols
        .into_iter()
        .next()
        .map(|s| (s.outcome, s.bars))
        .unwrap_or((Outcome::FetchEmpty, Vec::new()));

    let mut recent = RecentList::load(repo)?;
    recent.push(WatchItem::from(&quote));
    recent.save(repo)?;

    Ok(Some(Lookup { quote, outcome, bars }))
}

// ── Recently viewed ───────────────────────────────────────────────────────────

/// Bounded most-recently-used list, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentList {
    items: VecDeque<WatchItem>,
}

impl RecentList {
    pub fn from_items(items: Vec<WatchItem>) -> Self {
        let mut list = Self::default();
        // oldest first so the first element ends up at the front
        for item in items.into_iter().rev() {
            list.push(item);
        }
        list
    }

    pub fn load(repo: &Repository) -> Result<Self> {
        Ok(Self::from_items(repo.recent_items()?))
    }

    pub fn save(&self, repo: &Repository) -> Result<()> {
        repo.save_recent_items(&self.to_vec())
    }

    /// Insert at the front, dropping an older entry for the same symbol.
    pub fn push(&mut self, item: WatchItem) {
        self.items.retain(|i| i.symbol != item.symbol);
        self.items.push_front(item);
        self.items.truncate(RECENT_CAP);
    }

    pub fn remove(&mut self, symbol: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.symbol != symbol);
        self.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchItem> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<WatchItem> {
        self.items.iter().cloned().collect()
    }
}
