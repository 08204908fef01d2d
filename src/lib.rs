#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod flow;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod provider;
pub mod queue;
pub mod session;
pub mod token;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Action, ClientConfig, LogtoConfig, Pathnames};
pub use error::{BoxError, Error};
pub use flow::AuthFlow;
pub use provider::{IdentityProvider, SignInParams};
pub use queue::WriteQueue;
pub use session::{SessionBackend, SessionData, SessionKey, SessionStore};
pub use token::{CachedToken, Claims, TokenCache, TokenCaches, decode_claims};
pub use types::{AuthContext, ContextParams, InteractionMode, UserInfo, VisitorId};
