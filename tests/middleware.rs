//! End-to-end tests of the Logto middleware against an in-process router.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use logto_session::middleware::{Logto, LogtoState, with_logto};
use logto_session::{
    AuthContext, BoxError, ContextParams, IdentityProvider, LogtoConfig, SessionKey, SessionStore,
    SignInParams, UserInfo,
};

const AUTHORIZE: &str = "https://tenant.logto.app/oidc/auth";
const END_SESSION: &str = "https://tenant.logto.app/oidc/session/end";
const API: &str = "https://api.example.com";

/// Signs the visitor in by writing an id token into the session.
#[derive(Default, Clone)]
struct StubProvider {
    token_calls: Arc<AtomicUsize>,
    sign_in_modes: Arc<Mutex<Vec<String>>>,
}

fn jwt(iat: i64, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
    let body = URL_SAFE_NO_PAD.encode(json!({ "iat": iat, "exp": exp }).to_string());
    format!("{header}.{body}.sig")
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

impl IdentityProvider for StubProvider {
    async fn sign_in(
        &self,
        _session: &SessionStore,
        params: SignInParams,
    ) -> Result<Option<String>, BoxError> {
        self.sign_in_modes
            .lock()
            .unwrap()
            .push(params.interaction_mode.as_str().to_owned());
        Ok(Some(format!(
            "{AUTHORIZE}?redirect_uri={}",
            urlencoding::encode(&params.redirect_uri)
        )))
    }

    async fn handle_sign_in_callback(
        &self,
        session: &SessionStore,
        callback_url: &str,
    ) -> Result<(), BoxError> {
        let url = Url::parse(callback_url)?;
        let code = url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .ok_or("missing code")?;
        session.set(SessionKey::IdToken, format!("id-{code}")).await?;
        Ok(())
    }

    async fn sign_out(
        &self,
        _session: &SessionStore,
        post_logout_redirect_uri: Option<&str>,
    ) -> Result<Option<String>, BoxError> {
        Ok(Some(format!(
            "{END_SESSION}?post_logout_redirect_uri={}",
            urlencoding::encode(post_logout_redirect_uri.unwrap_or_default())
        )))
    }

    async fn get_context(
        &self,
        session: &SessionStore,
        params: ContextParams,
    ) -> Result<AuthContext, BoxError> {
        let is_authenticated = self.is_authenticated(session).await;
        let user_info = if is_authenticated && params.fetch_user_info {
            Some(self.fetch_user_info(session).await?)
        } else {
            None
        };
        Ok(AuthContext {
            is_authenticated,
            user_info,
            ..Default::default()
        })
    }

    async fn get_access_token(
        &self,
        _session: &SessionStore,
        _resource: Option<&str>,
        _organization_id: Option<&str>,
    ) -> Result<String, BoxError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(jwt(now(), now() + 3600))
    }

    async fn is_authenticated(&self, session: &SessionStore) -> bool {
        session.get(SessionKey::IdToken).is_some()
    }

    async fn fetch_user_info(&self, _session: &SessionStore) -> Result<UserInfo, BoxError> {
        Ok(UserInfo {
            sub: "user-1".into(),
            email: Some("user@example.com".into()),
            ..Default::default()
        })
    }
}

/// Browser stand-in: keeps cookies between requests.
struct Client {
    app: Router,
    provider: StubProvider,
    cookies: BTreeMap<String, String>,
}

impl Client {
    fn new() -> Self {
        let provider = StubProvider::default();
        let config = LogtoConfig::new(
            "https://tenant.logto.app",
            "app-id",
            "app-secret",
            "a-cookie-encryption-key",
        )
        .with_origin("https://shop.example.com".parse().unwrap())
        .with_resources(vec![API.into()]);
        let state = LogtoState::new(config, provider.clone());

        let app = Router::new()
            .route("/", get(|| async { "home" }))
            .route("/orders", get(orders));
        let app = with_logto(app, state);

        Self {
            app,
            provider,
            cookies: BTreeMap::new(),
        }
    }

    async fn get(&mut self, uri: &str) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if !self.cookies.is_empty() {
            let header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }

        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        for set_cookie in response.headers().get_all(SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let (name, value) = set_cookie
                .split(';')
                .next()
                .unwrap()
                .split_once('=')
                .unwrap();
            if set_cookie.contains("Max-Age=0") {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_owned(), value.to_owned());
            }
        }
        response
    }

    async fn sign_in(&mut self) {
        self.get("/sign-in").await;
        let response = self.get("/callback?code=abc&state=xyz").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }
}

async fn orders(logto: Option<Logto<StubProvider>>) -> String {
    let Some(logto) = logto else {
        return "no middleware".into();
    };
    match logto.bearer_header(API).await {
        Some(_) => "orders for user".into(),
        None => "anonymous".into(),
    }
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn sign_in_then_callback_returns_to_requested_page() {
    let mut client = Client::new();

    let response = client.get("/sign-in?redirectTo=%2Forders").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!(
            "{AUTHORIZE}?redirect_uri={}",
            urlencoding::encode("https://shop.example.com/callback")
        )
    );
    assert_eq!(client.cookies.len(), 1, "pending redirect is stored in the session cookie");

    let response = client.get("/callback?code=abc&state=xyz").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://shop.example.com/orders");

    let response = client.get("/logto/context").await;
    assert_eq!(json_body(response).await["isAuthenticated"], true);
}

#[tokio::test]
async fn callback_without_pending_redirect_goes_home() {
    let mut client = Client::new();

    client.get("/sign-in").await;
    let response = client.get("/callback?code=abc").await;
    assert_eq!(location(&response), "https://shop.example.com/");
}

#[tokio::test]
async fn failed_callback_is_500() {
    let mut client = Client::new();

    let response = client.get("/callback?error=access_denied").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn user_endpoints_require_a_session() {
    let mut client = Client::new();

    let response = client.get("/logto/user-info").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client.get("/logto/access-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client.get("/logto/context").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "isAuthenticated": false }));
}

#[tokio::test]
async fn user_info_is_returned_as_json() {
    let mut client = Client::new();
    client.sign_in().await;

    let response = client.get("/logto/user-info").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "sub": "user-1", "email": "user@example.com" })
    );
}

#[tokio::test]
async fn context_honours_query_options() {
    let mut client = Client::new();
    client.sign_in().await;

    let response = client.get("/logto/context?fetchUserInfo=true").await;
    let body = json_body(response).await;
    assert_eq!(body["isAuthenticated"], true);
    assert_eq!(body["userInfo"]["sub"], "user-1");

    let response = client.get("/logto/context?fetchUserInfo=maybe").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn access_token_is_served_as_json_string() {
    let mut client = Client::new();
    client.sign_in().await;

    let response = client
        .get(&format!("/logto/access-token?resource={}", urlencoding::encode(API)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = json_body(response).await;
    assert_eq!(token.as_str().unwrap().split('.').count(), 3);
}

#[tokio::test]
async fn sign_up_starts_sign_up_interaction() {
    let mut client = Client::new();

    let response = client.get("/sign-up").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(*client.provider.sign_in_modes.lock().unwrap(), ["signUp"]);
}

#[tokio::test]
async fn access_token_is_cached_across_requests() {
    let mut client = Client::new();
    client.sign_in().await;
    let uri = format!("/logto/access-token?resource={}", urlencoding::encode(API));

    let first = json_body(client.get(&uri).await).await;
    let second = json_body(client.get(&uri).await).await;
    assert_eq!(first, second);
    assert_eq!(client.provider.token_calls.load(Ordering::SeqCst), 1);

    // Unlisted resources fall back to an unscoped token, which is never cached.
    client.get("/logto/access-token?resource=https%3A%2F%2Fother.example.com").await;
    client.get("/logto/access-token?resource=https%3A%2F%2Fother.example.com").await;
    assert_eq!(client.provider.token_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn signing_in_as_someone_else_does_not_reuse_cached_tokens() {
    let mut client = Client::new();
    let uri = format!("/logto/access-token?resource={}", urlencoding::encode(API));

    client.get("/sign-in").await;
    client.get("/callback?code=alice").await;
    client.get(&uri).await;
    client.get(&uri).await;
    assert_eq!(client.provider.token_calls.load(Ordering::SeqCst), 1);

    client.get("/sign-in").await;
    let response = client.get("/callback?code=bob").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = client.get(&uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        client.provider.token_calls.load(Ordering::SeqCst),
        2,
        "the new identity must get its own token"
    );
}

#[tokio::test]
async fn sign_out_clears_session_and_redirects_to_end_session() {
    let mut client = Client::new();
    client.sign_in().await;
    assert!(!client.cookies.is_empty());

    let response = client.get("/sign-out").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!(
            "{END_SESSION}?post_logout_redirect_uri={}",
            urlencoding::encode("https://shop.example.com/")
        )
    );
    assert!(client.cookies.is_empty(), "session cookie must be removed");

    let response = client.get("/logto/user-info").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn other_paths_reach_the_application_with_the_flow_attached() {
    let mut client = Client::new();

    let response = client.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(client.cookies.is_empty(), "pass-through must not create a session");

    let response = client.get("/orders").await;
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"anonymous");

    client.sign_in().await;
    let response = client.get("/orders").await;
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"orders for user");
}

#[tokio::test]
async fn extractor_without_middleware_is_500() {
    async fn strict(_logto: Logto<StubProvider>) -> &'static str {
        "unreachable"
    }

    let app: Router = Router::new().route("/strict", get(strict));
    let response = app
        .oneshot(Request::builder().uri("/strict").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
