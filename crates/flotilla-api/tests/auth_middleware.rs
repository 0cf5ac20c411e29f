use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Extension, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flotilla_api::auth::{require_key, AuthKeys, KeyId};
use tower::ServiceExt;

fn app(keys: AuthKeys) -> Router {
    Router::new().route("/apps", get(|Extension(KeyId(id)): Extension<KeyId>| async move { id }))
                 .route("/ping", get(|| async { "pong" }))
                 .route("/ca-cert", get(|| async { "CERT" }))
                 .layer(from_fn_with_state(Arc::new(keys), require_key))
}

fn keys() -> AuthKeys { AuthKeys::new(vec!["s3cret".into(), "other".into()], vec!["ops".into(), "ci".into()]) }

async fn send(router: Router, req: Request<Body>) -> (StatusCode, String) {
    let res = router.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn missing_key_is_401_without_body() {
    let (status, body) = send(app(keys()), Request::get("/apps").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn basic_password_authorizes_and_exposes_key_id() {
    let basic = format!("Basic {}", STANDARD.encode(":s3cret"));
    let req = Request::get("/apps").header(header::AUTHORIZATION, basic).body(Body::empty()).unwrap();
    let (status, body) = send(app(keys()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ops");
}

#[tokio::test]
async fn auth_key_header_authorizes() {
    let req = Request::get("/apps").header("Auth-Key", "other").body(Body::empty()).unwrap();
    let (status, body) = send(app(keys()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ci");
}

#[tokio::test]
async fn wrong_key_is_rejected() {
    let req = Request::get("/apps").header("Auth-Key", "s3cre").body(Body::empty()).unwrap();
    let (status, _) = send(app(keys()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn query_key_only_counts_for_event_streams() {
    let plain = Request::get("/apps?key=s3cret").body(Body::empty()).unwrap();
    assert_eq!(send(app(keys()), plain).await.0, StatusCode::UNAUTHORIZED);

    let stream = Request::get("/apps?key=s3cret").header(header::ACCEPT, "text/event-stream")
                                                 .body(Body::empty())
                                                 .unwrap();
    assert_eq!(send(app(keys()), stream).await.0, StatusCode::OK);
}

#[tokio::test]
async fn query_key_is_percent_decoded() {
    let keys = AuthKeys::new(vec!["a+b/c=".into()], vec!["ops".into()]);
    let encoded = Request::get("/apps?past=true&key=a%2Bb%2Fc%3D").header(header::ACCEPT, "text/event-stream")
                                                                  .body(Body::empty())
                                                                  .unwrap();
    assert_eq!(send(app(keys.clone()), encoded).await.0, StatusCode::OK);

    // `+` en query es un espacio: la clave literal no coincide.
    let raw = Request::get("/apps?key=a+b/c=").header(header::ACCEPT, "text/event-stream")
                                             .body(Body::empty())
                                             .unwrap();
    assert_eq!(send(app(keys), raw).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn open_paths_and_options_skip_auth() {
    let (status, body) = send(app(keys()), Request::get("/ping").body(Body::empty()).unwrap()).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "pong"));
    let (status, _) = send(app(keys()), Request::get("/ca-cert").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let options = Request::builder().method(Method::OPTIONS).uri("/apps").body(Body::empty()).unwrap();
    assert_eq!(send(app(keys()), options).await.0, StatusCode::OK);
}

#[tokio::test]
async fn empty_key_list_rejects_everything() {
    let req = Request::get("/apps").header("Auth-Key", "").body(Body::empty()).unwrap();
    let (status, _) = send(app(AuthKeys::default()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
