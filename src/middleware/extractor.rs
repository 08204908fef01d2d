use std::convert::Infallible;
use std::ops::Deref;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use super::error::AuthError;
use crate::flow::AuthFlow;
use crate::provider::IdentityProvider;

/// The visitor's [`AuthFlow`], attached by the Logto middleware.
///
/// Use it in handlers that call protected APIs on the visitor's behalf.
///
/// # Example
///
/// ```rust,ignore
/// async fn orders(logto: Logto<MyProvider>) -> impl IntoResponse {
///     let bearer = logto.bearer_header("https://api.example.com").await;
///     // attach `bearer` to the outbound request
/// }
/// ```
pub struct Logto<P>(pub AuthFlow<P>);

impl<P> Deref for Logto<P> {
    type Target = AuthFlow<P>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<P, S> FromRequestParts<S> for Logto<P>
where
    P: IdentityProvider,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthFlow<P>>()
            .cloned()
            .map(Logto)
            .ok_or(AuthError::MissingMiddleware)
    }
}

impl<P, S> OptionalFromRequestParts<S> for Logto<P>
where
    P: IdentityProvider,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthFlow<P>>().cloned().map(Logto))
    }
}
