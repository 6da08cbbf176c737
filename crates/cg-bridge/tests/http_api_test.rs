use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cg_bridge::documents::{DocumentError, DocumentFetcher, DocumentResolver};
use cg_bridge::http_api::{api_router, ApiState};
use cg_bridge::session_guard::{LoginCredentials, SessionGuard, SESSION_COOKIE};
use cg_core::token::TokenAuthenticator;
use cg_core::types::ConnectionState;
use cg_session::client::{ClientEvent, InboundMessage, LifecycleUpdate};
use cg_session::loopback::{LoopbackClient, SentMessage};
use cg_session::store::CredentialStore;
use cg_session::{ConnectionSession, ReconnectPolicy};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test-key";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct NoNetwork;

#[async_trait]
impl DocumentFetcher for NoNetwork {
    async fn fetch(&self, url: &url::Url, _max: usize) -> Result<Vec<u8>, DocumentError> {
        Err(DocumentError::FetchFailed(format!("offline: {url}")))
    }
}

struct Fixture {
    client: LoopbackClient,
    state: Arc<ApiState>,
    _tmp: tempfile::TempDir,
}

impl Fixture {
    fn app(&self) -> Router {
        api_router(self.state.clone())
    }

    fn session(&self) -> &ConnectionSession {
        &self.state.session
    }
}

fn fixture(client: LoopbackClient) -> Fixture {
    fixture_with_restart_delay(client, Duration::from_millis(10))
}

fn fixture_with_restart_delay(client: LoopbackClient, restart_delay: Duration) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let session = ConnectionSession::builder(client.clone())
        .store(CredentialStore::new(tmp.path().join("auth_info")))
        .policy(ReconnectPolicy {
            base_delay: Duration::from_secs(3600),
            cap_delay: Duration::from_secs(3600),
            ..ReconnectPolicy::default()
        })
        .build();
    let guard = SessionGuard::new(
        TokenAuthenticator::new("token-secret"),
        LoginCredentials {
            user: "admin".into(),
            password: "hunter2".into(),
        },
    );
    let state = ApiState::new(
        session,
        guard,
        DocumentResolver::new(NoNetwork, 1024 * 1024),
        API_KEY,
    )
    .with_restart_delay(restart_delay);
    Fixture {
        client,
        state: Arc::new(state),
        _tmp: tmp,
    }
}

async fn wait_for<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

async fn connected_fixture() -> Fixture {
    connected_fixture_with_restart_delay(Duration::from_millis(10)).await
}

async fn connected_fixture_with_restart_delay(restart_delay: Duration) -> Fixture {
    let f = fixture_with_restart_delay(
        LoopbackClient::scripted(vec![ClientEvent::ConnectionUpdate(
            LifecycleUpdate::opened(),
        )]),
        restart_delay,
    );
    f.session().start().await;
    let s = f.session().clone();
    wait_for(|| {
        let s = s.clone();
        async move { s.snapshot().await.connected }
    })
    .await;
    f
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-API-Key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-API-Key", API_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ===========================================================================
// Public endpoints
// ===========================================================================

#[tokio::test]
async fn test_health_needs_no_key() {
    let f = fixture(LoopbackClient::new());
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = f.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));

    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connectionState"], "disconnected");
    assert!(body["uptime"].is_number());
}

#[tokio::test]
async fn test_index_is_html() {
    let f = fixture(LoopbackClient::new());
    let req = Request::builder().uri("/").body(Body::empty()).unwrap();
    let resp = f.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(ct.starts_with("text/html"));
}

// ===========================================================================
// API key
// ===========================================================================

#[tokio::test]
async fn test_status_requires_key() {
    let f = fixture(LoopbackClient::new());

    let req = Request::builder().uri("/status").body(Body::empty()).unwrap();
    let resp = f.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await, json!({"error": "unauthorized"}));

    let req = Request::builder()
        .uri("/status")
        .header("Authorization", format!("Bearer {API_KEY}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(f.app().oneshot(req).await.unwrap().status(), StatusCode::OK);

    let req = Request::builder()
        .uri(format!("/status?apiKey={API_KEY}"))
        .body(Body::empty())
        .unwrap();
    let resp = f.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["connected"], false);
    assert_eq!(body["pairingAvailable"], false);
    assert_eq!(body["reconnectAttempts"], 0);
}

#[tokio::test]
async fn test_metrics_requires_key() {
    let f = fixture(LoopbackClient::new());
    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    assert_eq!(
        f.app().oneshot(req).await.unwrap().status(),
        StatusCode::UNAUTHORIZED
    );

    let resp = f.app().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(ct.starts_with("text/plain"));
}

// ===========================================================================
// /send
// ===========================================================================

#[tokio::test]
async fn test_send_while_disconnected_is_503() {
    let f = fixture(LoopbackClient::new());
    let resp = f
        .app()
        .oneshot(post_json("/send", json!({"to": "123", "message": "hi"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["state"], "disconnected");
    assert!(f.client.sent().is_empty());
    assert_eq!(f.client.connect_count(), 0);
}

#[tokio::test]
async fn test_send_missing_fields_is_400() {
    let f = connected_fixture().await;
    for body in [json!({"to": "123"}), json!({"message": "hi"}), json!({"to": "", "message": "hi"})] {
        let resp = f.app().oneshot(post_json("/send", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let req = Request::builder()
        .method("POST")
        .uri("/send")
        .header("X-API-Key", API_KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(
        f.app().oneshot(req).await.unwrap().status(),
        StatusCode::BAD_REQUEST
    );
    assert!(f.client.sent().is_empty());
}

#[tokio::test]
async fn test_send_delivers_to_client() {
    let f = connected_fixture().await;
    let resp = f
        .app()
        .oneshot(post_json("/send", json!({"to": "5215500000000", "message": "hola"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["to"], "5215500000000");
    assert!(body["timestamp"].is_string());

    assert_eq!(
        f.client.sent(),
        vec![SentMessage::Text {
            jid: "5215500000000@s.whatsapp.net".into(),
            text: "hola".into()
        }]
    );
}

#[tokio::test]
async fn test_send_client_failure_is_500() {
    let f = connected_fixture().await;
    f.client.fail_sends(true);
    let resp = f
        .app()
        .oneshot(post_json("/send", json!({"to": "1", "message": "x"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert!(body["details"].as_str().unwrap().contains("refused"));
}

// ===========================================================================
// /send-document
// ===========================================================================

const PDF_B64: &str = "JVBERi0xLjQKJcfsj6IK"; // "%PDF-1.4\n%...\n"

#[tokio::test]
async fn test_send_document_from_base64() {
    let f = connected_fixture().await;
    let resp = f
        .app()
        .oneshot(post_json(
            "/send-document",
            json!({"to": "111", "base64": format!("data:application/pdf;base64,{PDF_B64}"), "message": "  Q3 report "}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "document.pdf");
    assert_eq!(body["hasCaption"], true);

    match &f.client.sent()[0] {
        SentMessage::Document {
            jid,
            mimetype,
            caption,
            ..
        } => {
            assert_eq!(jid, "111@s.whatsapp.net");
            assert_eq!(mimetype, "application/pdf");
            assert_eq!(caption.as_deref(), Some("Q3 report"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_send_document_rejections() {
    let f = connected_fixture().await;

    // Not a PDF.
    let resp = f
        .app()
        .oneshot(post_json(
            "/send-document",
            json!({"to": "111", "base64": "aGVsbG8gd29ybGQ="}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // No source.
    let resp = f
        .app()
        .oneshot(post_json("/send-document", json!({"to": "111"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Fetch failure.
    let resp = f
        .app()
        .oneshot(post_json(
            "/send-document",
            json!({"to": "111", "url": "https://example.invalid/a.pdf"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    assert!(f.client.sent().is_empty());
}

#[tokio::test]
async fn test_send_document_while_disconnected_is_503() {
    let f = fixture(LoopbackClient::new());
    let resp = f
        .app()
        .oneshot(post_json(
            "/send-document",
            json!({"to": "111", "base64": PDF_B64}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ===========================================================================
// /history
// ===========================================================================

#[tokio::test]
async fn test_history_returns_most_recent_in_order() {
    let f = fixture(LoopbackClient::new());
    for i in 1..=12 {
        f.session()
            .on_inbound_message(InboundMessage::text(
                "1@s.whatsapp.net",
                &format!("m{i}"),
                &format!("Text {i}"),
            ))
            .await;
    }

    let resp = f.app().oneshot(get("/history?limit=10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["total"], 12);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 10);
    assert_eq!(messages[0]["messageId"], "m3");
    assert_eq!(messages[9]["messageId"], "m12");
    assert_eq!(messages[9]["body"], "text 12");
    assert_eq!(messages[9]["displayName"], "User");

    let body = body_json(f.app().oneshot(get("/history")).await.unwrap()).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 12);
}

// ===========================================================================
// Login + /pairing
// ===========================================================================

fn login_request(user: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={user}&password={password}")))
        .unwrap()
}

async fn login_cookie(app: Router) -> String {
    let resp = app.oneshot(login_request("admin", "hunter2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/pairing?format=image");
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));
    assert!(cookie.contains("HttpOnly"));
    cookie.split(';').next().unwrap().to_string()
}

fn pairing_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_login_page_and_wrong_password() {
    let f = fixture(LoopbackClient::new());
    let req = Request::builder().uri("/login").body(Body::empty()).unwrap();
    let resp = f.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = f
        .app()
        .oneshot(login_request("admin", "nope"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(!resp.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_pairing_requires_session_token() {
    let f = fixture(LoopbackClient::new());
    f.session().start().await;
    f.session()
        .handle_lifecycle_event(LifecycleUpdate::pairing("2@pairing-payload"))
        .await;

    let resp = f
        .app()
        .oneshot(pairing_request("/pairing", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // The API key is not a substitute for the login cookie.
    let resp = f.app().oneshot(get("/pairing")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = f
        .app()
        .oneshot(pairing_request(
            "/pairing",
            Some(&format!("{SESSION_COOKIE}=forged.0123")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_then_pairing_json_and_image() {
    let f = fixture(LoopbackClient::new());
    f.session().start().await;
    let cookie = login_cookie(f.app()).await;

    // Logged in but nothing to show yet.
    let resp = f
        .app()
        .oneshot(pairing_request("/pairing", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["state"], "connecting");

    f.session()
        .handle_lifecycle_event(LifecycleUpdate::pairing("2@pairing-payload"))
        .await;

    let resp = f
        .app()
        .oneshot(pairing_request("/pairing?format=json", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["credential"], "2@pairing-payload");
    assert_eq!(body["state"], "pairing_ready");
    assert!(body["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let resp = f
        .app()
        .oneshot(pairing_request("/pairing?format=image", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));

    let resp = f
        .app()
        .oneshot(pairing_request("/pairing?format=svg", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pairing_when_connected_is_informational() {
    let f = connected_fixture().await;
    let resp = f
        .app()
        .oneshot(pairing_request("/pairing", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["state"], "connected");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_logout_page_clears_cookie() {
    let f = fixture(LoopbackClient::new());
    let req = Request::builder().uri("/logout").body(Body::empty()).unwrap();
    let resp = f.app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/login");
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
}

// ===========================================================================
// /session/logout
// ===========================================================================

#[tokio::test]
async fn test_session_logout_restarts() {
    let f = connected_fixture().await;
    assert_eq!(f.client.connect_count(), 1);

    let resp = f
        .app()
        .oneshot(post_json("/session/logout", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["restartInMs"], 10);
    assert_eq!(f.client.logout_count(), 1);

    let client = f.client.clone();
    wait_for(|| {
        let client = client.clone();
        async move { client.connect_count() == 2 }
    })
    .await;
}

#[tokio::test]
async fn test_repeated_logout_restarts_once() {
    let f = connected_fixture_with_restart_delay(Duration::from_millis(100)).await;
    assert_eq!(f.client.connect_count(), 1);

    let resp = f
        .app()
        .oneshot(post_json("/session/logout", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let resp = f
        .app()
        .oneshot(post_json("/session/logout", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.client.connect_count(), 2);
    assert_eq!(f.session().state().await, ConnectionState::Connected);
}
