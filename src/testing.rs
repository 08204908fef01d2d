//! In-memory session backend and a scripted identity provider for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{BoxError, Error};
use crate::provider::{IdentityProvider, SignInParams};
use crate::session::{SessionBackend, SessionData, SessionKey, SessionStore};
use crate::token::{encode_test_token, now_seconds};
use crate::types::{AuthContext, ContextParams, UserInfo};

#[derive(Default)]
pub(crate) struct MemoryBackend {
    data: Mutex<SessionData>,
    pub(crate) persists: AtomicUsize,
}

impl SessionBackend for MemoryBackend {
    fn get(&self, key: SessionKey) -> Option<String> {
        self.data.lock().unwrap().get(key).map(str::to_owned)
    }

    fn set(&self, key: SessionKey, value: String) {
        self.data.lock().unwrap().set(key, Some(value));
    }

    fn delete(&self, key: SessionKey) {
        self.data.lock().unwrap().set(key, None);
    }

    fn clear(&self) {
        *self.data.lock().unwrap() = SessionData::default();
    }

    async fn persist(&self) -> Result<(), Error> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn memory_session() -> SessionStore {
    memory_backed_session().1
}

/// A session plus the backend behind it, for asserting on persists.
pub(crate) fn memory_backed_session() -> (Arc<MemoryBackend>, SessionStore) {
    let backend = Arc::new(MemoryBackend::default());
    (backend.clone(), SessionStore::new(backend))
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    pub(crate) authenticated: AtomicBool,
    pub(crate) fail_flows: AtomicBool,
    pub(crate) fail_reads: AtomicBool,
    navigate: Option<String>,
    issued: Option<String>,
    pub(crate) sign_in_calls: Mutex<Vec<SignInParams>>,
    pub(crate) callback_urls: Mutex<Vec<String>>,
    pub(crate) sign_out_uris: Mutex<Vec<Option<String>>>,
    pub(crate) context_params: Mutex<Vec<ContextParams>>,
    pub(crate) token_calls: Mutex<Vec<(Option<String>, Option<String>)>>,
    pub(crate) user_info_calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn authenticated() -> Self {
        let provider = Self::default();
        provider.authenticated.store(true, Ordering::SeqCst);
        provider
    }

    pub(crate) fn navigating_to(mut self, url: &str) -> Self {
        self.navigate = Some(url.to_owned());
        self
    }

    pub(crate) fn issuing(mut self, token: &str) -> Self {
        self.issued = Some(token.to_owned());
        self
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), BoxError> {
        if flag.load(Ordering::SeqCst) {
            Err(format!("{what} failed").into())
        } else {
            Ok(())
        }
    }
}

impl IdentityProvider for FakeProvider {
    async fn sign_in(
        &self,
        _session: &SessionStore,
        params: SignInParams,
    ) -> Result<Option<String>, BoxError> {
        Self::check(&self.fail_flows, "sign-in")?;
        self.sign_in_calls.lock().unwrap().push(params);
        Ok(self.navigate.clone())
    }

    async fn handle_sign_in_callback(
        &self,
        session: &SessionStore,
        callback_url: &str,
    ) -> Result<(), BoxError> {
        Self::check(&self.fail_flows, "callback")?;
        self.callback_urls.lock().unwrap().push(callback_url.to_owned());
        session.set(SessionKey::IdToken, "id-token").await?;
        Ok(())
    }

    async fn sign_out(
        &self,
        _session: &SessionStore,
        post_logout_redirect_uri: Option<&str>,
    ) -> Result<Option<String>, BoxError> {
        Self::check(&self.fail_flows, "sign-out")?;
        self.sign_out_uris
            .lock()
            .unwrap()
            .push(post_logout_redirect_uri.map(str::to_owned));
        Ok(self.navigate.clone())
    }

    async fn get_context(
        &self,
        _session: &SessionStore,
        params: ContextParams,
    ) -> Result<AuthContext, BoxError> {
        Self::check(&self.fail_reads, "context")?;
        self.context_params.lock().unwrap().push(params);
        Ok(AuthContext {
            is_authenticated: self.authenticated.load(Ordering::SeqCst),
            ..Default::default()
        })
    }

    async fn get_access_token(
        &self,
        _session: &SessionStore,
        resource: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<String, BoxError> {
        self.token_calls
            .lock()
            .unwrap()
            .push((resource.map(str::to_owned), organization_id.map(str::to_owned)));
        Self::check(&self.fail_reads, "access token")?;
        let now = now_seconds();
        Ok(self
            .issued
            .clone()
            .unwrap_or_else(|| encode_test_token(Some(now), Some(now + 3600))))
    }

    async fn is_authenticated(&self, _session: &SessionStore) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn fetch_user_info(&self, _session: &SessionStore) -> Result<UserInfo, BoxError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_reads, "user info")?;
        Ok(UserInfo {
            sub: "user-1".into(),
            ..Default::default()
        })
    }
}
