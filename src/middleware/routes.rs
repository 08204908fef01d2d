use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::PrivateCookieJar;
use serde::Serialize;
use url::{Url, form_urlencoded};

use super::cookies::CookieSession;
use super::error::AuthError;
use super::state::LogtoState;
use crate::config::{Action, LogtoConfig};
use crate::error::Error;
use crate::flow::AuthFlow;
use crate::provider::IdentityProvider;
use crate::session::SessionStore;
use crate::types::{ContextParams, InteractionMode};

/// Wrap `app` with the Logto middleware.
///
/// Requests to the configured auth paths are answered by the middleware; every
/// other request reaches `app` with the visitor's [`AuthFlow`] attached (see
/// [`Logto`](super::Logto)).
pub fn with_logto<P: IdentityProvider>(app: Router, state: LogtoState<P>) -> Router {
    Router::new()
        .fallback_service(app)
        .layer(middleware::from_fn_with_state(state, handle::<P>))
}

/// The Logto middleware function, for use with [`axum::middleware::from_fn_with_state`].
pub async fn handle<P: IdentityProvider>(
    State(state): State<LogtoState<P>>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie = Arc::new(CookieSession::load(
        jar,
        state.cookie_name.clone(),
        state.config.cookie_secure(),
    ));
    let flow = AuthFlow::new(
        state.provider.clone(),
        SessionStore::new(cookie.clone()),
        state.caches.clone(),
        state.config.clone(),
    );

    let action = state.config.pathnames().classify(request.uri().path());
    let response = match dispatch(&flow, action, request.uri()).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            request.extensions_mut().insert(flow);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };

    (cookie.jar(), response).into_response()
}

/// Answer an auth request. `None` hands the request on to the application.
async fn dispatch<P: IdentityProvider>(
    flow: &AuthFlow<P>,
    action: Action,
    uri: &Uri,
) -> Result<Option<Response>, AuthError> {
    let config = flow.config();
    let query = uri.query().unwrap_or_default();

    match action {
        Action::SignIn | Action::SignUp => {
            let mode = if action == Action::SignUp {
                InteractionMode::SignUp
            } else {
                InteractionMode::SignIn
            };
            let callback = absolute(config.origin(), &config.pathnames().callback)?;
            let return_to = query_param(query, "redirectTo");
            let navigate = flow
                .sign_in(callback, mode, return_to.as_deref())
                .await?;
            Ok(navigate.map(|url| Redirect::to(&url).into_response()))
        }
        Action::Callback => {
            let url = request_url(config, uri)?;
            let target = flow.handle_callback(&url, None).await?;
            Ok(Some(Redirect::to(&target).into_response()))
        }
        Action::SignOut => {
            let url = request_url(config, uri)?;
            let navigate = flow.sign_out(&url, None).await?;
            Ok(navigate.map(|url| Redirect::to(&url).into_response()))
        }
        Action::Context => {
            let params = if query.is_empty() {
                ContextParams {
                    fetch_user_info: config.fetch_user_info(),
                    get_access_token: config.get_access_token(),
                    ..ContextParams::default()
                }
            } else {
                ContextParams::from_query(form_urlencoded::parse(query.as_bytes()))?
            };
            Ok(Some(Json(flow.context(params).await).into_response()))
        }
        Action::UserInfo => {
            let info = flow.user_info().await?;
            Ok(Some(json_or_no_content(info)))
        }
        Action::AccessToken => {
            let resource = query_param(query, "resource");
            let organization_id = query_param(query, "organizationId");
            let token = flow
                .access_token(resource.as_deref(), organization_id.as_deref())
                .await?;
            Ok(Some(json_or_no_content(token)))
        }
        Action::PassThrough => Ok(None),
    }
}

fn json_or_no_content<T: Serialize>(value: Option<T>) -> Response {
    match value {
        Some(value) => Json(value).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn query_param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Full URL of the inbound request, as seen from the configured origin.
fn request_url(config: &LogtoConfig, uri: &Uri) -> Result<Url, Error> {
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    config.origin().join(path).map_err(|e| Error::InvalidRedirect {
        target: path.to_owned(),
        reason: e.to_string(),
    })
}

fn absolute(origin: &Url, path: &str) -> Result<String, Error> {
    origin
        .join(path)
        .map(Into::into)
        .map_err(|e| Error::InvalidRedirect {
            target: path.to_owned(),
            reason: e.to_string(),
        })
}
