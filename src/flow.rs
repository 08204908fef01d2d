//! Sign-in, callback, sign-out and token retrieval for one request.

use std::sync::Arc;

use url::Url;

use crate::config::LogtoConfig;
use crate::error::Error;
use crate::provider::{IdentityProvider, SignInParams};
use crate::session::{SessionKey, SessionStore};
use crate::token::TokenCaches;
use crate::types::{AuthContext, ContextParams, InteractionMode, UserInfo};

/// Authentication flow controller.
///
/// Created per request around the visitor's session; the provider, the token
/// cache arena and the configuration are shared process-wide.
pub struct AuthFlow<P> {
    provider: Arc<P>,
    session: SessionStore,
    caches: Arc<TokenCaches>,
    config: Arc<LogtoConfig>,
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for AuthFlow<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            session: self.session.clone(),
            caches: self.caches.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P: IdentityProvider> AuthFlow<P> {
    pub fn new(
        provider: Arc<P>,
        session: SessionStore,
        caches: Arc<TokenCaches>,
        config: Arc<LogtoConfig>,
    ) -> Self {
        Self {
            provider,
            session,
            caches,
            config,
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn config(&self) -> &LogtoConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Start a sign-in (or sign-up) and remember where to return afterwards.
    ///
    /// `redirect_uri` is the callback URI handed to the provider. `return_to`
    /// is stored as the pending redirect; without it the pending redirect is
    /// cleared. Returns the URL the visitor should be redirected to, if the
    /// provider produced one.
    ///
    /// # Errors
    ///
    /// Propagates provider and session failures.
    pub async fn sign_in(
        &self,
        redirect_uri: impl Into<String>,
        interaction_mode: InteractionMode,
        return_to: Option<&str>,
    ) -> Result<Option<String>, Error> {
        let params = SignInParams {
            redirect_uri: redirect_uri.into(),
            interaction_mode,
        };
        let navigate = self
            .provider
            .sign_in(&self.session, params)
            .await
            .map_err(Error::Provider)?;

        match return_to.filter(|target| !target.is_empty()) {
            Some(target) => self.session.set(SessionKey::RedirectTo, target).await?,
            None => self.session.remove(SessionKey::RedirectTo).await?,
        }

        Ok(navigate)
    }

    /// Complete a sign-in and return where to send the visitor.
    ///
    /// Target priority: `redirect_to`, then the pending redirect stored at
    /// sign-in, then the configured post-callback URI. The latter two are
    /// resolved against `request_url`. The pending redirect is left in place.
    /// Tokens cached for the visitor are dropped and a new visitor id is
    /// assigned on the next cached token request.
    ///
    /// # Errors
    ///
    /// Propagates provider failures and unresolvable targets.
    pub async fn handle_callback(
        &self,
        request_url: &Url,
        redirect_to: Option<&str>,
    ) -> Result<String, Error> {
        let target = match redirect_to {
            Some(explicit) => explicit.to_owned(),
            None => {
                let stored = self.session.get(SessionKey::RedirectTo);
                let relative = stored
                    .as_deref()
                    .unwrap_or(self.config.post_callback_redirect_uri());
                resolve(request_url, relative)?
            }
        };

        self.provider
            .handle_sign_in_callback(&self.session, request_url.as_str())
            .await
            .map_err(Error::Provider)?;

        // A new identity must not inherit tokens cached for the previous one.
        if let Some(visitor) = self.session.current_visitor_id() {
            self.caches.evict(visitor);
            self.session.remove(SessionKey::VisitorId).await?;
        }

        tracing::info!("Logto sign-in callback handled");
        Ok(target)
    }

    /// Sign out at the provider, then destroy the session.
    ///
    /// Returns the provider's end-session URL, if any.
    ///
    /// # Errors
    ///
    /// Propagates provider and session failures. When the provider call fails
    /// the session is left untouched.
    pub async fn sign_out(
        &self,
        request_url: &Url,
        redirect_uri: Option<&str>,
    ) -> Result<Option<String>, Error> {
        let post_logout = match redirect_uri {
            Some(uri) => uri.to_owned(),
            None => resolve(request_url, self.config.post_logout_redirect_uri())?,
        };

        let navigate = self
            .provider
            .sign_out(&self.session, Some(&post_logout))
            .await
            .map_err(Error::Provider)?;

        let visitor = self.session.current_visitor_id();
        self.session.destroy().await?;
        if let Some(visitor) = visitor {
            self.caches.evict(visitor);
        }

        tracing::info!("Logto sign-out completed");
        Ok(navigate)
    }

    /// The visitor's auth context. Provider failures yield an empty context.
    pub async fn context(&self, params: ContextParams) -> AuthContext {
        match self.provider.get_context(&self.session, params).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get Logto context");
                AuthContext::default()
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.provider.is_authenticated(&self.session).await
    }

    /// User info of the signed-in visitor. Provider failures yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] if the visitor is not signed in.
    pub async fn user_info(&self) -> Result<Option<UserInfo>, Error> {
        if !self.is_authenticated().await {
            return Err(Error::Unauthenticated);
        }

        match self.provider.fetch_user_info(&self.session).await {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch user info");
                Ok(None)
            }
        }
    }

    /// Access token for `resource` and/or `organization_id`.
    ///
    /// Tokens for allow-listed resources are served from the visitor's cache
    /// while fresh. Resources outside the allow-list are dropped and an
    /// unscoped token is requested; unscoped and organization tokens are never
    /// cached. Any failure yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] if the visitor is not signed in.
    pub async fn access_token(
        &self,
        resource: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<Option<String>, Error> {
        if !self.is_authenticated().await {
            return Err(Error::Unauthenticated);
        }

        let resource = non_blank(resource);
        let organization_id = non_blank(organization_id);
        let allowed = resource.filter(|r| self.config.allows_resource(r));
        if let (Some(requested), None) = (resource, allowed) {
            tracing::debug!(resource = %requested, "Resource not allowed; requesting unscoped token");
        }

        match self.fetch_access_token(allowed, organization_id).await {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get access token");
                Ok(None)
            }
        }
    }

    /// `Bearer <token>` for outbound calls to `resource`, when a token is available.
    pub async fn bearer_header(&self, resource: &str) -> Option<String> {
        self.access_token(Some(resource), None)
            .await
            .ok()
            .flatten()
            .map(|token| format!("Bearer {token}"))
    }

    async fn fetch_access_token(
        &self,
        resource: Option<&str>,
        organization_id: Option<&str>,
    ) -> Result<String, Error> {
        let cacheable = resource.filter(|_| organization_id.is_none());
        let Some(resource) = cacheable else {
            return self
                .provider
                .get_access_token(&self.session, resource, organization_id)
                .await
                .map_err(Error::Provider);
        };

        let visitor = self.session.visitor_id().await?;
        if let Some(token) = self.caches.load(visitor, resource) {
            tracing::debug!(resource = %resource, "Access token cache hit");
            return Ok(token);
        }

        tracing::debug!(resource = %resource, "Access token cache miss");
        let token = self
            .provider
            .get_access_token(&self.session, Some(resource), None)
            .await
            .map_err(Error::Provider)?;
        self.caches.store(visitor, resource, token.clone())?;
        Ok(token)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve `target` (absolute or relative) against `base`.
fn resolve(base: &Url, target: &str) -> Result<String, Error> {
    base.join(target)
        .map(Into::into)
        .map_err(|e| Error::InvalidRedirect {
            target: target.to_owned(),
            reason: e.to_string(),
        })
}
