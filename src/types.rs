use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use ulid::Ulid;

use crate::error::Error;

/// Opaque per-visitor identifier stored in the session cookie.
///
/// Keys the process-wide token cache so cached tokens survive across
/// requests of the same visitor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr, From, Into,
)]
#[serde(transparent)]
pub struct VisitorId(pub Ulid);

impl VisitorId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

/// Which interaction the identity provider should start with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionMode {
    #[default]
    SignIn,
    SignUp,
}

impl InteractionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "signIn",
            Self::SignUp => "signUp",
        }
    }
}

/// User info returned by the identity provider's userinfo endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Any other claims (`custom_data`, `organizations`, ...).
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Authentication context of the current visitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_token: Option<String>,
}

/// Options for [`IdentityProvider::get_context`](crate::IdentityProvider::get_context).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextParams {
    pub fetch_user_info: bool,
    pub get_access_token: bool,
    pub get_organization_token: bool,
    pub resource: Option<String>,
    pub organization_id: Option<String>,
}

impl ContextParams {
    /// Parse options from query pairs.
    ///
    /// Only `fetchUserInfo`, `getAccessToken`, `getOrganizationToken`,
    /// `organizationId` and `resource` are read; other keys and blank values
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] if a boolean option is neither `true`
    /// nor `false` (case-insensitive).
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            if value.is_empty() {
                continue;
            }
            match key {
                "fetchUserInfo" => params.fetch_user_info = parse_bool(key, value)?,
                "getAccessToken" => params.get_access_token = parse_bool(key, value)?,
                "getOrganizationToken" => {
                    params.get_organization_token = parse_bool(key, value)?;
                }
                "organizationId" => params.organization_id = Some(value.to_owned()),
                "resource" => params.resource = Some(value.to_owned()),
                _ => {}
            }
        }
        Ok(params)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::InvalidQuery {
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }
}
