//! Logto session middleware for Axum.
//!
//! The middleware answers the auth endpoints (sign-in, sign-up, callback,
//! sign-out, context, user info, access token) and attaches the visitor's
//! [`AuthFlow`](crate::AuthFlow) to every other request. The session lives in
//! an encrypted cookie and is rewritten whenever it changes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use logto_session::LogtoConfig;
//! use logto_session::middleware::{Logto, LogtoState, with_logto};
//!
//! // 1. Implement IdentityProvider around your Logto client
//! // 2. Configure from environment
//! let config = LogtoConfig::from_env()?;
//!
//! // 3. Wrap the application router
//! let app = axum::Router::new().route("/orders", get(orders));
//! let app = with_logto(app, LogtoState::new(config, provider));
//!
//! // 4. Use the `Logto` extractor in handlers
//! async fn orders(logto: Logto<MyProvider>) { /* ... */ }
//! ```

mod cookies;
mod error;
mod extractor;
mod routes;
mod state;

pub use cookies::CookieSession;
pub use error::AuthError;
pub use extractor::Logto;
pub use routes::{handle, with_logto};
pub use state::LogtoState;

/// Re-export cookie key type for custom jar handling.
pub use axum_extra::extract::cookie::Key as CookieKey;
