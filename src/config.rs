use std::sync::Once;

use url::Url;

use crate::error::Error;

/// Placeholder values that must be replaced before going to production.
pub const PLACEHOLDER_ENDPOINT: &str = "<replace-with-logto-endpoint>";
pub const PLACEHOLDER_APP_ID: &str = "<replace-with-logto-app-id>";
pub const PLACEHOLDER_APP_SECRET: &str = "<replace-with-logto-app-secret>";
pub const PLACEHOLDER_COOKIE_ENCRYPTION_KEY: &str = "<replace-with-random-string>";

/// Prefix of the default session cookie name (`logto:<app_id>`).
pub const COOKIE_NAME_PREFIX: &str = "logto";

/// Session cookie lifetime.
pub const COOKIE_MAX_AGE_DAYS: i64 = 14;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

static PLACEHOLDER_WARNING: Once = Once::new();

/// Request classification produced by [`Pathnames::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SignIn,
    SignUp,
    SignOut,
    Callback,
    Context,
    UserInfo,
    AccessToken,
    PassThrough,
}

/// Paths handled by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pathnames {
    pub sign_in: String,
    pub sign_up: String,
    pub sign_out: String,
    pub callback: String,
    pub context: String,
    pub user_info: String,
    pub access_token: String,
}

impl Default for Pathnames {
    fn default() -> Self {
        Self {
            sign_in: "/sign-in".into(),
            sign_up: "/sign-up".into(),
            sign_out: "/sign-out".into(),
            callback: "/callback".into(),
            context: "/logto/context".into(),
            user_info: "/logto/user-info".into(),
            access_token: "/logto/access-token".into(),
        }
    }
}

impl Pathnames {
    /// Classify a request path. Matching is exact; anything else passes through.
    #[must_use]
    pub fn classify(&self, path: &str) -> Action {
        [
            (&self.sign_in, Action::SignIn),
            (&self.sign_up, Action::SignUp),
            (&self.sign_out, Action::SignOut),
            (&self.callback, Action::Callback),
            (&self.context, Action::Context),
            (&self.user_info, Action::UserInfo),
            (&self.access_token, Action::AccessToken),
        ]
        .into_iter()
        .find_map(|(candidate, action)| (candidate == path).then_some(action))
        .unwrap_or(Action::PassThrough)
    }

    /// Link that starts sign-in and returns to `redirect_to` afterwards.
    #[must_use]
    pub fn sign_in_url(&self, origin: &Url, redirect_to: Option<&str>) -> String {
        with_redirect_to(join(origin, &self.sign_in), redirect_to)
    }

    /// Link that starts sign-up and returns to `redirect_to` afterwards.
    #[must_use]
    pub fn sign_up_url(&self, origin: &Url, redirect_to: Option<&str>) -> String {
        with_redirect_to(join(origin, &self.sign_up), redirect_to)
    }

    #[must_use]
    pub fn sign_out_url(&self, origin: &Url) -> String {
        join(origin, &self.sign_out)
    }
}

fn join(origin: &Url, path: &str) -> String {
    origin
        .join(path)
        .map_or_else(|_| format!("{}{path}", origin.as_str().trim_end_matches('/')), Into::into)
}

fn with_redirect_to(url: String, redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(target) => format!("{url}?redirectTo={}", urlencoding::encode(target)),
        None => url,
    }
}

/// Settings the identity provider client is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub app_id: String,
    pub app_secret: String,
    pub scopes: Vec<String>,
    pub resources: Vec<String>,
}

/// Logto integration configuration.
///
/// Required fields are constructor parameters; everything else has a default
/// and a `with_*` override.
#[derive(Debug, Clone)]
pub struct LogtoConfig {
    pub(crate) client: ClientConfig,
    pub(crate) cookie_encryption_key: String,
    pub(crate) origin: Url,
    pub(crate) cookie_name: Option<String>,
    pub(crate) cookie_secure: bool,
    pub(crate) fetch_user_info: bool,
    pub(crate) get_access_token: bool,
    pub(crate) post_callback_redirect_uri: String,
    pub(crate) post_logout_redirect_uri: String,
    pub(crate) pathnames: Pathnames,
}

impl Default for LogtoConfig {
    /// Configuration made of placeholders only.
    fn default() -> Self {
        Self::new(
            PLACEHOLDER_ENDPOINT,
            PLACEHOLDER_APP_ID,
            PLACEHOLDER_APP_SECRET,
            PLACEHOLDER_COOKIE_ENCRYPTION_KEY,
        )
    }
}

impl LogtoConfig {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        cookie_encryption_key: impl Into<String>,
    ) -> Self {
        Self {
            client: ClientConfig {
                endpoint: endpoint.into(),
                app_id: app_id.into(),
                app_secret: app_secret.into(),
                scopes: Vec::new(),
                resources: Vec::new(),
            },
            cookie_encryption_key: cookie_encryption_key.into(),
            origin: DEFAULT_ORIGIN.parse().expect("valid default origin"),
            cookie_name: None,
            cookie_secure: true,
            fetch_user_info: false,
            get_access_token: false,
            post_callback_redirect_uri: "/".into(),
            post_logout_redirect_uri: "/".into(),
            pathnames: Pathnames::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Env vars
    /// - `LOGTO_ENDPOINT`, `LOGTO_APP_ID`, `LOGTO_APP_SECRET`,
    ///   `LOGTO_COOKIE_ENCRYPTION_KEY`: fall back to placeholders (with a warning
    ///   at startup) when unset
    /// - `LOGTO_ORIGIN`: public base URL of the application
    /// - `LOGTO_COOKIE_NAME`, `LOGTO_COOKIE_SECURE`
    /// - `LOGTO_FETCH_USER_INFO`, `LOGTO_GET_ACCESS_TOKEN`
    /// - `LOGTO_POST_CALLBACK_REDIRECT_URI`, `LOGTO_POST_LOGOUT_REDIRECT_URI`
    /// - `LOGTO_RESOURCES`, `LOGTO_SCOPES`: comma-separated lists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `LOGTO_ORIGIN` is not a URL or a boolean
    /// variable is not one of `1`, `0`, `true`, `false`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let mut config = Self::new(
            var("LOGTO_ENDPOINT", PLACEHOLDER_ENDPOINT),
            var("LOGTO_APP_ID", PLACEHOLDER_APP_ID),
            var("LOGTO_APP_SECRET", PLACEHOLDER_APP_SECRET),
            var("LOGTO_COOKIE_ENCRYPTION_KEY", PLACEHOLDER_COOKIE_ENCRYPTION_KEY),
        );

        if let Some(origin) = lookup("LOGTO_ORIGIN") {
            let origin: Url = origin
                .parse()
                .map_err(|e| Error::Config(format!("LOGTO_ORIGIN: {e}")))?;
            config = config.with_origin(origin);
        }
        if let Some(name) = lookup("LOGTO_COOKIE_NAME") {
            config = config.with_cookie_name(name);
        }
        if let Some(secure) = lookup("LOGTO_COOKIE_SECURE") {
            config = config.with_cookie_secure(env_bool("LOGTO_COOKIE_SECURE", &secure)?);
        }
        if let Some(fetch) = lookup("LOGTO_FETCH_USER_INFO") {
            config = config.with_fetch_user_info(env_bool("LOGTO_FETCH_USER_INFO", &fetch)?);
        }
        if let Some(get) = lookup("LOGTO_GET_ACCESS_TOKEN") {
            config = config.with_get_access_token(env_bool("LOGTO_GET_ACCESS_TOKEN", &get)?);
        }
        if let Some(uri) = lookup("LOGTO_POST_CALLBACK_REDIRECT_URI") {
            config = config.with_post_callback_redirect_uri(uri);
        }
        if let Some(uri) = lookup("LOGTO_POST_LOGOUT_REDIRECT_URI") {
            config = config.with_post_logout_redirect_uri(uri);
        }
        if let Some(resources) = lookup("LOGTO_RESOURCES") {
            config = config.with_resources(split_list(&resources));
        }
        if let Some(scopes) = lookup("LOGTO_SCOPES") {
            config = config.with_scopes(split_list(&scopes));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_fetch_user_info(mut self, fetch: bool) -> Self {
        self.fetch_user_info = fetch;
        self
    }

    #[must_use]
    pub fn with_get_access_token(mut self, get: bool) -> Self {
        self.get_access_token = get;
        self
    }

    #[must_use]
    pub fn with_post_callback_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_callback_redirect_uri = uri.into();
        self
    }

    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = uri.into();
        self
    }

    /// Resources whose access tokens may be requested and cached.
    #[must_use]
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.client.resources = resources;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.client.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_pathnames(mut self, pathnames: Pathnames) -> Self {
        self.pathnames = pathnames;
        self
    }

    #[must_use]
    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    #[must_use]
    pub fn pathnames(&self) -> &Pathnames {
        &self.pathnames
    }

    /// Session cookie name, `logto:<app_id>` unless overridden.
    #[must_use]
    pub fn cookie_name(&self) -> String {
        self.cookie_name
            .clone()
            .unwrap_or_else(|| format!("{COOKIE_NAME_PREFIX}:{}", self.client.app_id))
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn cookie_encryption_key(&self) -> &str {
        &self.cookie_encryption_key
    }

    #[must_use]
    pub fn fetch_user_info(&self) -> bool {
        self.fetch_user_info
    }

    #[must_use]
    pub fn get_access_token(&self) -> bool {
        self.get_access_token
    }

    #[must_use]
    pub fn post_callback_redirect_uri(&self) -> &str {
        &self.post_callback_redirect_uri
    }

    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> &str {
        &self.post_logout_redirect_uri
    }

    /// Whether `resource` is in the configured allow-list.
    #[must_use]
    pub fn allows_resource(&self, resource: &str) -> bool {
        self.client.resources.iter().any(|r| r == resource)
    }

    /// Keys still set to their placeholder value.
    #[must_use]
    pub fn placeholder_keys(&self) -> Vec<&'static str> {
        [
            ("endpoint", self.client.endpoint.as_str(), PLACEHOLDER_ENDPOINT),
            ("appId", self.client.app_id.as_str(), PLACEHOLDER_APP_ID),
            ("appSecret", self.client.app_secret.as_str(), PLACEHOLDER_APP_SECRET),
            (
                "cookieEncryptionKey",
                self.cookie_encryption_key.as_str(),
                PLACEHOLDER_COOKIE_ENCRYPTION_KEY,
            ),
        ]
        .into_iter()
        .filter(|(_, value, placeholder)| value == placeholder)
        .map(|(key, _, _)| key)
        .collect()
    }

    /// Log the placeholder keys once per process.
    pub fn warn_placeholders(&self) {
        let keys = self.placeholder_keys();
        if keys.is_empty() {
            return;
        }
        PLACEHOLDER_WARNING.call_once(|| {
            tracing::warn!(
                keys = %keys.join(", "),
                "Logto configuration keys still have placeholder values; replace them with your own"
            );
        });
    }
}

fn env_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
