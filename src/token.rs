//! Resource-scoped access token cache.

use std::sync::atomic::{AtomicI64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::config::COOKIE_MAX_AGE_DAYS;
use crate::error::Error;
use crate::types::VisitorId;

/// Share of a token's lifetime after which it is renewed instead of served.
const RENEWAL_FRACTION: f64 = 0.1;

/// A visitor untouched for this long has lost its session cookie.
const IDLE_LIMIT_SECS: i64 = COOKIE_MAX_AGE_DAYS * 24 * 60 * 60;

/// Minimum spacing between two sweeps of the visitor arena.
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Standard time claims of an access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the claims of a JWT without verifying its signature.
///
/// # Errors
///
/// Returns `Error::Token` if the token is not three dot-separated segments or
/// the payload is not base64url-encoded JSON.
pub fn decode_claims(token: &str) -> Result<Claims, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::Token("invalid token format".into()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|_| Error::Token("invalid payload encoding".into()))?;

    serde_json::from_slice(&payload).map_err(|e| Error::Token(format!("invalid payload: {e}")))
}

/// Current unix time in seconds, rounded up.
#[must_use]
pub fn now_seconds() -> i64 {
    let now = OffsetDateTime::now_utc();
    let secs = now.unix_timestamp();
    if now.nanosecond() > 0 { secs + 1 } else { secs }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub claims: Claims,
}

impl CachedToken {
    /// Whether the token may still be served at `now`.
    ///
    /// Expired tokens are never served, and neither are tokens with less than
    /// a tenth of their lifetime left.
    #[must_use]
    pub fn is_fresh_at(&self, now: i64) -> bool {
        let remain = self.claims.exp.map_or(0, |exp| exp - now);
        if remain <= 0 {
            return false;
        }

        let total = match (self.claims.exp, self.claims.iat) {
            (Some(exp), Some(iat)) => exp - iat,
            _ => 0,
        };
        let threshold = (total as f64 * RENEWAL_FRACTION).ceil();
        remain as f64 > threshold
    }
}

/// One visitor's tokens, keyed by resource indicator.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: IndexMap<String, CachedToken>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token for `resource` if it is still fresh.
    #[must_use]
    pub fn load(&self, resource: &str) -> Option<&str> {
        self.load_at(resource, now_seconds())
    }

    #[must_use]
    pub fn load_at(&self, resource: &str, now: i64) -> Option<&str> {
        self.entries
            .get(resource)
            .filter(|cached| cached.is_fresh_at(now))
            .map(|cached| cached.token.as_str())
    }

    /// Decode `token` and store it, replacing any previous entry for `resource`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Token` if the claims cannot be decoded; the cache is
    /// left untouched in that case.
    pub fn store(&mut self, resource: &str, token: impl Into<String>) -> Result<(), Error> {
        let token = token.into();
        let claims = decode_claims(&token)?;
        self.insert(resource, CachedToken { token, claims });
        Ok(())
    }

    /// Insert an already decoded entry, moving it to the end of the order.
    pub fn insert(&mut self, resource: &str, cached: CachedToken) {
        self.entries.shift_remove(resource);
        self.entries.insert(resource.to_owned(), cached);
    }

    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&CachedToken> {
        self.entries.get(resource)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resources in insertion order.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether any entry is still unexpired at `now`.
    #[must_use]
    pub fn has_unexpired_at(&self, now: i64) -> bool {
        self.entries
            .values()
            .any(|cached| cached.claims.exp.is_some_and(|exp| exp > now))
    }
}

#[derive(Debug, Default)]
struct VisitorCache {
    cache: TokenCache,
    touched: i64,
}

impl VisitorCache {
    fn is_live_at(&self, now: i64) -> bool {
        now - self.touched < IDLE_LIMIT_SECS && self.cache.has_unexpired_at(now)
    }
}

/// Process-wide arena of per-visitor token caches.
///
/// Reads and writes are individually atomic; a load followed by a store is
/// not, so two concurrent misses both fetch and the later store wins.
///
/// Visitors whose tokens have all expired, or who have not been seen for the
/// session cookie lifetime, are swept on store, at most once a minute.
#[derive(Debug, Default)]
pub struct TokenCaches {
    visitors: DashMap<VisitorId, VisitorCache>,
    last_sweep: AtomicI64,
}

impl TokenCaches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn load(&self, visitor: VisitorId, resource: &str) -> Option<String> {
        self.load_at(visitor, resource, now_seconds())
    }

    #[must_use]
    pub fn load_at(&self, visitor: VisitorId, resource: &str, now: i64) -> Option<String> {
        let mut entry = self.visitors.get_mut(&visitor)?;
        entry.touched = now;
        entry.cache.load_at(resource, now).map(str::to_owned)
    }

    /// # Errors
    ///
    /// Returns `Error::Token` if the token claims cannot be decoded.
    pub fn store(
        &self,
        visitor: VisitorId,
        resource: &str,
        token: impl Into<String>,
    ) -> Result<(), Error> {
        self.store_at(visitor, resource, token, now_seconds())
    }

    /// # Errors
    ///
    /// Returns `Error::Token` if the token claims cannot be decoded.
    pub fn store_at(
        &self,
        visitor: VisitorId,
        resource: &str,
        token: impl Into<String>,
        now: i64,
    ) -> Result<(), Error> {
        self.maybe_sweep(now);

        let result = {
            let mut entry = self.visitors.entry(visitor).or_default();
            entry.touched = now;
            entry.cache.store(resource, token)
        };
        if result.is_err() {
            self.visitors.remove_if(&visitor, |_, entry| entry.cache.is_empty());
        }
        result
    }

    /// Drop everything cached for `visitor`.
    pub fn evict(&self, visitor: VisitorId) {
        self.visitors.remove(&visitor);
    }

    /// Drop visitors with no unexpired token or idle past the cookie lifetime.
    /// Returns how many were dropped.
    pub fn sweep_at(&self, now: i64) -> usize {
        let before = self.visitors.len();
        self.visitors.retain(|_, entry| entry.is_live_at(now));
        let removed = before.saturating_sub(self.visitors.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept idle access token caches");
        }
        removed
    }

    fn maybe_sweep(&self, now: i64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now < last.saturating_add(SWEEP_INTERVAL_SECS) {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep_at(now);
        }
    }

    /// Number of cached entries for `visitor`.
    #[must_use]
    pub fn entries(&self, visitor: VisitorId) -> usize {
        self.visitors.get(&visitor).map_or(0, |entry| entry.cache.len())
    }

    /// Number of visitors with a cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(iat: Option<i64>, exp: Option<i64>) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert("sub".into(), "user-1".into());
    if let Some(iat) = iat {
        payload.insert("iat".into(), iat.into());
    }
    if let Some(exp) = exp {
        payload.insert("exp".into(), exp.into());
    }
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    format!("{header}.{body}.signature")
}
