use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::config::LogtoConfig;
use crate::provider::IdentityProvider;
use crate::token::TokenCaches;

/// Shared state for the Logto middleware.
pub struct LogtoState<P> {
    pub(super) provider: Arc<P>,
    pub(super) config: Arc<LogtoConfig>,
    pub(super) caches: Arc<TokenCaches>,
    pub(super) cookie_key: Key,
    pub(super) cookie_name: String,
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for LogtoState<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            config: self.config.clone(),
            caches: self.caches.clone(),
            cookie_key: self.cookie_key.clone(),
            cookie_name: self.cookie_name.clone(),
        }
    }
}

impl<P: IdentityProvider> LogtoState<P> {
    /// Build the middleware state. Warns once if the config still has placeholders.
    pub fn new(config: LogtoConfig, provider: P) -> Self {
        config.warn_placeholders();

        Self {
            provider: Arc::new(provider),
            cookie_key: cookie_key(config.cookie_encryption_key()),
            cookie_name: config.cookie_name(),
            config: Arc::new(config),
            caches: Arc::new(TokenCaches::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LogtoConfig {
        &self.config
    }

    /// Token caches of every visitor served by this state.
    #[must_use]
    pub fn caches(&self) -> &Arc<TokenCaches> {
        &self.caches
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<P> FromRef<LogtoState<P>> for Key {
    fn from_ref(state: &LogtoState<P>) -> Self {
        state.cookie_key.clone()
    }
}

/// Derive the 64-byte cookie key from a secret of any length.
pub(super) fn cookie_key(secret: &str) -> Key {
    Key::from(Sha512::digest(secret.as_bytes()).as_slice())
}
