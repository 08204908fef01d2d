use std::future::Future;

use crate::error::BoxError;
use crate::session::SessionStore;
use crate::types::{AuthContext, ContextParams, InteractionMode, UserInfo};

/// Parameters for starting a sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInParams {
    /// Where the provider sends the visitor back to (the callback route).
    pub redirect_uri: String,
    pub interaction_mode: InteractionMode,
}

/// Identity provider client primitives.
///
/// The client keeps its tokens and sign-in state in the visitor's
/// [`SessionStore`], which every call receives. Navigation is reported, not
/// performed: operations that would redirect return the target URL.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentityProvider for MyLogtoClient {
///     async fn is_authenticated(&self, session: &SessionStore) -> bool {
///         session.get(SessionKey::IdToken).is_some()
///     }
///     // ...
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    /// Start a sign-in. Returns the authorization URL to navigate to, if any.
    fn sign_in(
        &self,
        session: &SessionStore,
        params: SignInParams,
    ) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;

    /// Complete a sign-in from the full callback URL (code exchange).
    fn handle_sign_in_callback(
        &self,
        session: &SessionStore,
        callback_url: &str,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Sign out. Returns the end-session URL to navigate to, if any.
    fn sign_out(
        &self,
        session: &SessionStore,
        post_logout_redirect_uri: Option<&str>,
    ) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;

    fn get_context(
        &self,
        session: &SessionStore,
        params: ContextParams,
    ) -> impl Future<Output = Result<AuthContext, BoxError>> + Send;

    /// Get an access token, scoped to `resource` and/or `organization_id` when given.
    fn get_access_token(
        &self,
        session: &SessionStore,
        resource: Option<&str>,
        organization_id: Option<&str>,
    ) -> impl Future<Output = Result<String, BoxError>> + Send;

    fn is_authenticated(&self, session: &SessionStore) -> impl Future<Output = bool> + Send;

    fn fetch_user_info(
        &self,
        session: &SessionStore,
    ) -> impl Future<Output = Result<UserInfo, BoxError>> + Send;
}
