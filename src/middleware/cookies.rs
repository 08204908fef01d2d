use std::sync::{Mutex, MutexGuard, PoisonError};

use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::COOKIE_MAX_AGE_DAYS;
use crate::error::Error;
use crate::session::{SessionBackend, SessionData, SessionKey};

/// Create the session cookie.
pub(super) fn session_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

/// Create removal cookie for the session.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

struct CookieState {
    data: SessionData,
    jar: PrivateCookieJar,
}

/// Session stored as JSON in an encrypted cookie.
///
/// Mutations stay in memory until [`persist`](SessionBackend::persist), which
/// re-encrypts the cookie into the jar. The jar's delta becomes the response's
/// `Set-Cookie` headers.
pub struct CookieSession {
    name: String,
    secure: bool,
    state: Mutex<CookieState>,
}

impl CookieSession {
    /// Read the session from `jar`. A missing or undecodable cookie is an empty session.
    #[must_use]
    pub fn load(jar: PrivateCookieJar, name: impl Into<String>, secure: bool) -> Self {
        let name = name.into();
        let data = jar
            .get(&name)
            .and_then(|cookie| match serde_json::from_str(cookie.value()) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::debug!(error = %e, "Discarding undecodable session cookie");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            name,
            secure,
            state: Mutex::new(CookieState { data, jar }),
        }
    }

    /// Snapshot of the current (possibly unpersisted) session fields.
    #[must_use]
    pub fn data(&self) -> SessionData {
        self.lock().data.clone()
    }

    /// The jar with every persisted change applied.
    #[must_use]
    pub fn jar(&self) -> PrivateCookieJar {
        self.lock().jar.clone()
    }

    fn write_cookie(&self) -> Result<(), Error> {
        let mut state = self.lock();
        let jar = state.jar.clone();
        state.jar = if state.data.is_empty() {
            jar.remove(clear_session_cookie(&self.name))
        } else {
            let value = serde_json::to_string(&state.data)
                .map_err(|e| Error::Session(format!("encode session: {e}")))?;
            jar.add(session_cookie(&self.name, value, self.secure))
        };
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, CookieState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionBackend for CookieSession {
    fn get(&self, key: SessionKey) -> Option<String> {
        self.lock().data.get(key).map(str::to_owned)
    }

    fn set(&self, key: SessionKey, value: String) {
        self.lock().data.set(key, Some(value));
    }

    fn delete(&self, key: SessionKey) {
        self.lock().data.set(key, None);
    }

    fn clear(&self) {
        self.lock().data = SessionData::default();
    }

    fn persist(&self) -> impl std::future::Future<Output = Result<(), Error>> + Send {
        std::future::ready(self.write_cookie())
    }
}
