use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::Error;

/// Errors surfaced by the Logto middleware and extractor.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authenticated session.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Malformed query option.
    #[error("{0}")]
    InvalidQuery(String),

    /// Sign-in, callback or sign-out failed.
    #[error("Logto flow error: {0}")]
    Flow(#[source] Error),

    /// `Logto` extractor used on a route the middleware does not wrap.
    #[error("Logto middleware is not installed")]
    MissingMiddleware,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            Self::InvalidQuery(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()).into_response(),
            Self::Flow(_) | Self::MissingMiddleware => {
                tracing::error!(error = %self, "Logto internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<Error> for AuthError {
    fn from(e: Error) -> Self {
        match e {
            Error::Unauthenticated => Self::Unauthenticated,
            Error::InvalidQuery { .. } => Self::InvalidQuery(e.to_string()),
            other => Self::Flow(other),
        }
    }
}
