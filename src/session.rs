//! Per-visitor key/value session with serialized persistence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::queue::WriteQueue;
use crate::types::VisitorId;

/// Keys stored in the visitor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    AccessToken,
    IdToken,
    SignInSession,
    RefreshToken,
    /// Post-login destination carried through the sign-in round trip.
    RedirectTo,
    VisitorId,
}

impl SessionKey {
    pub const ALL: [Self; 6] = [
        Self::AccessToken,
        Self::IdToken,
        Self::SignInSession,
        Self::RefreshToken,
        Self::RedirectTo,
        Self::VisitorId,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "accessToken",
            Self::IdToken => "idToken",
            Self::SignInSession => "signInSession",
            Self::RefreshToken => "refreshToken",
            Self::RedirectTo => "redirectTo",
            Self::VisitorId => "visitorId",
        }
    }
}

/// Session fields as persisted in the cookie.
///
/// Every field is either absent or a non-empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
}

impl SessionData {
    #[must_use]
    pub fn get(&self, key: SessionKey) -> Option<&str> {
        self.slot(key).as_deref()
    }

    /// Set or clear a field. Empty values clear it.
    pub fn set(&mut self, key: SessionKey, value: Option<String>) {
        *self.slot_mut(key) = value.filter(|v| !v.is_empty());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        SessionKey::ALL.iter().all(|k| self.slot(*k).is_none())
    }

    fn slot(&self, key: SessionKey) -> &Option<String> {
        match key {
            SessionKey::AccessToken => &self.access_token,
            SessionKey::IdToken => &self.id_token,
            SessionKey::SignInSession => &self.sign_in_session,
            SessionKey::RefreshToken => &self.refresh_token,
            SessionKey::RedirectTo => &self.redirect_to,
            SessionKey::VisitorId => &self.visitor_id,
        }
    }

    fn slot_mut(&mut self, key: SessionKey) -> &mut Option<String> {
        match key {
            SessionKey::AccessToken => &mut self.access_token,
            SessionKey::IdToken => &mut self.id_token,
            SessionKey::SignInSession => &mut self.sign_in_session,
            SessionKey::RefreshToken => &mut self.refresh_token,
            SessionKey::RedirectTo => &mut self.redirect_to,
            SessionKey::VisitorId => &mut self.visitor_id,
        }
    }
}

/// The underlying session object (e.g. an encrypted cookie).
///
/// Reads and writes are in-memory; [`persist`](SessionBackend::persist) is the
/// I/O step that makes them durable. [`SessionStore`] routes every persist
/// through a [`WriteQueue`].
pub trait SessionBackend: Send + Sync + 'static {
    fn get(&self, key: SessionKey) -> Option<String>;

    fn set(&self, key: SessionKey, value: String);

    fn delete(&self, key: SessionKey);

    /// Drop every field and invalidate the session.
    fn clear(&self);

    /// Write the current state out.
    fn persist(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Object-safe wrapper for SessionBackend (needed for Arc<dyn>).
pub(crate) trait SessionBackendDyn: Send + Sync {
    fn get_dyn(&self, key: SessionKey) -> Option<String>;
    fn set_dyn(&self, key: SessionKey, value: String);
    fn delete_dyn(&self, key: SessionKey);
    fn clear_dyn(&self);
    fn persist_dyn(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;
}

impl<T: SessionBackend> SessionBackendDyn for T {
    fn get_dyn(&self, key: SessionKey) -> Option<String> {
        self.get(key)
    }

    fn set_dyn(&self, key: SessionKey, value: String) {
        self.set(key, value);
    }

    fn delete_dyn(&self, key: SessionKey) {
        self.delete(key);
    }

    fn clear_dyn(&self) {
        self.clear();
    }

    fn persist_dyn(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(self.persist())
    }
}

/// Key/value façade over a [`SessionBackend`].
///
/// Each mutation updates the backend, then waits for exactly one persist,
/// queued behind any persist already in flight for the same session.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackendDyn>,
    queue: WriteQueue,
}

impl SessionStore {
    pub fn new<B: SessionBackend>(backend: Arc<B>) -> Self {
        Self {
            backend,
            queue: WriteQueue::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: SessionKey) -> Option<String> {
        self.backend.get_dyn(key)
    }

    /// Set `key`; an empty `value` removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the session fails.
    pub async fn set(&self, key: SessionKey, value: impl Into<String>) -> Result<(), Error> {
        let value = value.into();
        if value.is_empty() {
            self.backend.delete_dyn(key);
        } else {
            self.backend.set_dyn(key, value);
        }
        self.persist().await
    }

    /// # Errors
    ///
    /// Returns an error if persisting the session fails.
    pub async fn remove(&self, key: SessionKey) -> Result<(), Error> {
        self.backend.delete_dyn(key);
        self.persist().await
    }

    /// Clear every field and invalidate the session.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the session fails.
    pub async fn destroy(&self) -> Result<(), Error> {
        self.backend.clear_dyn();
        self.persist().await
    }

    /// The visitor id, assigned and persisted on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting a newly assigned id fails.
    pub async fn visitor_id(&self) -> Result<VisitorId, Error> {
        if let Some(id) = self.current_visitor_id() {
            return Ok(id);
        }
        let id = VisitorId::generate();
        self.set(SessionKey::VisitorId, id.to_string()).await?;
        Ok(id)
    }

    /// The visitor id if one was assigned already. Malformed values count as absent.
    #[must_use]
    pub fn current_visitor_id(&self) -> Option<VisitorId> {
        self.get(SessionKey::VisitorId)?.parse().ok()
    }

    async fn persist(&self) -> Result<(), Error> {
        let backend = self.backend.clone();
        self.queue
            .enqueue(async move { backend.persist_dyn().await })
            .await
    }
}
