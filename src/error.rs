/// Boxed error returned by [`IdentityProvider`](crate::IdentityProvider) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity provider client failed.
    #[error("Identity provider error: {0}")]
    Provider(#[source] BoxError),

    /// The visitor has no authenticated session.
    #[error("Not authenticated")]
    Unauthenticated,

    /// A token payload could not be decoded into claims.
    #[error("Token decode error: {0}")]
    Token(String),

    /// Persisting the session failed.
    #[error("Session error: {0}")]
    Session(String),

    /// The write queue stopped before the task completed.
    #[error("Session write queue aborted")]
    QueueAborted,

    /// A redirect target could not be resolved against the request URL.
    #[error("Invalid redirect target '{target}': {reason}")]
    InvalidRedirect { target: String, reason: String },

    /// A recognized query option carried a malformed value.
    #[error("Invalid value for query option `{key}`: {value}")]
    InvalidQuery { key: String, value: String },

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
