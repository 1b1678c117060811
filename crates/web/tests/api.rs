//! HTTP-level tests of the reference backend, driven through the router
//! without binding a socket.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

use statehub_common::wire::{ErrorBody, VersionListResponse, STATE_VERSION_HEADER};
use statehub_common::StateVersion;
use statehub_web::{router, AppState, TokenTable};

const STATE: &str = "/api/v1/projects/proj-1/states/main";

fn app() -> Router {
    let tokens = TokenTable::parse("alice:tok-alice,bob:tok-bob").unwrap();
    router(Arc::new(AppState::new(tokens)))
}

fn request(method: &str, uri: &str, token: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body.into())
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn health_is_public() {
    let resp = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let resp = app()
        .oneshot(Request::get(STATE).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app()
        .oneshot(request("GET", STATE, "bogus", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn write_then_read_and_list() {
    let app = app();

    let resp = app
        .clone()
        .oneshot(request("POST", STATE, "tok-alice", r#"{"a":1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let meta: StateVersion = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(meta.version, 1);
    assert_eq!(meta.created_by, "alice");

    let resp = app
        .clone()
        .oneshot(request("GET", STATE, "tok-bob", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[STATE_VERSION_HEADER], "1");
    assert_eq!(body_bytes(resp).await, br#"{"a":1}"#);

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("{STATE}/versions"), "tok-bob", Body::empty()))
        .await
        .unwrap();
    let list: VersionListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(list.versions.len(), 1);
}

#[tokio::test]
async fn unknown_object_lists_empty_and_reads_not_found() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("{STATE}/versions"), "tok-alice", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let list: VersionListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(list.versions.is_empty());

    let resp = app
        .oneshot(request("GET", STATE, "tok-alice", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_expected_version_is_precondition_failed() {
    let app = app();
    app.clone()
        .oneshot(request("POST", STATE, "tok-alice", "{}"))
        .await
        .unwrap();

    let resp = app
        .oneshot(request(
            "POST",
            &format!("{STATE}?expected_version=0"),
            "tok-alice",
            "{}",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    let body: ErrorBody = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.current_version, Some(1));
}

#[tokio::test]
async fn lock_and_unlock_methods() {
    let app = app();
    let alice = r#"{"ID":"l-1","Who":"alice"}"#;
    let bob = r#"{"ID":"l-2","Who":"bob"}"#;

    let resp = app.clone().oneshot(request("LOCK", STATE, "tok-alice", alice)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.clone().oneshot(request("LOCK", STATE, "tok-bob", bob)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::LOCKED);
    let body: ErrorBody = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.holder.unwrap().who(), Some("alice"));

    let resp = app.clone().oneshot(request("UNLOCK", STATE, "tok-bob", bob)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::LOCKED);

    let resp = app.clone().oneshot(request("UNLOCK", STATE, "tok-alice", alice)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(request("LOCK", STATE, "tok-bob", bob)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_of_missing_version_is_no_content() {
    let resp = app()
        .oneshot(request("DELETE", &format!("{STATE}?version=9"), "tok-alice", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn locked_delete_needs_the_lock_id() {
    let app = app();
    app.clone()
        .oneshot(request("POST", STATE, "tok-alice", "{}"))
        .await
        .unwrap();
    let lock = r#"{"ID":"l-1","Who":"alice"}"#;
    let resp = app.clone().oneshot(request("LOCK", STATE, "tok-alice", lock)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request("DELETE", STATE, "tok-bob", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::LOCKED);

    // Missing targets stay a no-op under the lock
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("{STATE}?version=9"), "tok-bob", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("{STATE}?lock_id=l-1"), "tok-alice", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .oneshot(request("GET", &format!("{STATE}/versions"), "tok-alice", Body::empty()))
        .await
        .unwrap();
    let list: VersionListResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(list.versions.is_empty());
}

#[tokio::test]
async fn state_larger_than_default_body_limit() {
    let app = app();
    let filler = "x".repeat(3 * 1024 * 1024);
    let body = format!(r#"{{"filler":"{filler}"}}"#);

    let resp = app
        .clone()
        .oneshot(request("POST", STATE, "tok-alice", body.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(request("GET", STATE, "tok-alice", Body::empty()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, body.as_bytes());
}

#[tokio::test]
async fn configured_body_limit_is_enforced() {
    let tokens = TokenTable::parse("alice:tok-alice").unwrap();
    let app = router(Arc::new(AppState::new(tokens).with_max_body_bytes(1024)));

    let resp = app
        .oneshot(request("POST", STATE, "tok-alice", "y".repeat(4096)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
