use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use flotilla_adapters::{BlobstoreClient, ClusterClient, DiscoverdClient, RouterClient};
use flotilla_api::{router, ApiConfig, ApiState, AuthKeys};
use flotilla_core::EventBroker;
use flotilla_domain::NameGenerator;
use flotilla_infra::InfraContext;
use flotilla_persistence::{Db, DbConfig, PgEventListener};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const KEY: &str = "test-key";

async fn test_router() -> Option<Router> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return None;
    }
    let mut cfg = DbConfig::from_env().ok()?;
    cfg.min_connections = 1;
    cfg.max_connections = 4;
    let db: Arc<Db> = match Db::connect(cfg).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("skip (db: {e})");
            return None;
        }
    };
    let discoverd = DiscoverdClient::new("http://127.0.0.1:1");
    let ctx = InfraContext { listener: PgEventListener::new(db.clone(), EventBroker::new()),
                             db,
                             names: Arc::new(NameGenerator::from_entropy()),
                             cluster: ClusterClient::with_hosts(Vec::new()),
                             discoverd,
                             router: RouterClient::new("http://127.0.0.1:1"),
                             blobstore: BlobstoreClient::new("http://127.0.0.1:1"),
                             default_domain: "test.local".into() };
    let config = ApiConfig { auth_keys: AuthKeys::new(vec![KEY.into()], vec!["test".into()]),
                             ca_cert: Some("CERT".into()),
                             audit_log: true };
    Some(router(ApiState::new(&ctx, config)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri).header("Auth-Key", KEY);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 4 * 1024 * 1024).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

fn unique(prefix: &str) -> String { format!("{prefix}-{}", Uuid::new_v4().simple()) }

async fn create_release(app: &Router, app_id: &str) -> Value {
    let (status, artifact) = call(app,
                                  Method::POST,
                                  "/artifacts",
                                  Some(json!({"type": "docker", "uri": format!("https://registry.test/{}", Uuid::new_v4())}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, release) = call(app,
                                 Method::POST,
                                 "/releases",
                                 Some(json!({"app_id": app_id,
                                             "artifacts": [artifact["id"]],
                                             "env": {"PORT": "8080"},
                                             "processes": {"web": {"args": ["serve"]}}}))).await;
    assert_eq!(status, StatusCode::CREATED);
    release
}

#[tokio::test]
async fn app_lifecycle_through_http() {
    let Some(app) = test_router().await else { return };
    let name = unique("web");
    let (status, created) = call(&app, Method::POST, "/apps", Some(json!({"name": name}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, by_name) = call(&app, Method::GET, &format!("/apps/{name}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_name["id"], created["id"]);

    let (status, updated) = call(&app, Method::POST, &format!("/apps/{id}/meta"), Some(json!({"meta": {"owner": "ops"}}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["meta"]["owner"], "ops");

    let (status, _) = call(&app, Method::DELETE, &format!("/apps/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, &format!("/apps/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "object_not_found");
}

#[tokio::test]
async fn first_deploy_sets_the_release() {
    let Some(app) = test_router().await else { return };
    let (_, created) = call(&app, Method::POST, "/apps", Some(json!({"name": unique("deploy")}))).await;
    let id = created["id"].as_str().unwrap().to_string();
    let release = create_release(&app, &id).await;

    let (status, deployment) =
        call(&app, Method::POST, &format!("/apps/{id}/deploy"), Some(json!({"id": release["id"], "processes": {"web": 1}}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deployment["status"], "complete");

    let (status, current) = call(&app, Method::GET, &format!("/apps/{id}/release"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["id"], release["id"]);

    let (status, formation) = call(&app, Method::GET, &format!("/apps/{id}/formations/{}", release["id"].as_str().unwrap()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(formation["processes"]["web"], 1);

    let (status, events) = call(&app, Method::GET, &format!("/events?app_id={id}&object_types=deployment"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!events.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn validation_errors_have_the_error_shape() {
    let Some(app) = test_router().await else { return };
    let (_, created) = call(&app, Method::POST, "/apps", Some(json!({"name": unique("scale")}))).await;
    let id = created["id"].as_str().unwrap().to_string();
    let release = create_release(&app, &id).await;

    let (status, body) = call(&app,
                              Method::PUT,
                              &format!("/apps/{id}/formations/{}", release["id"].as_str().unwrap()),
                              Some(json!({"processes": {"worker": 1}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["retry"], false);

    let (status, body) = call(&app, Method::GET, "/events", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());
}

#[tokio::test]
async fn system_endpoints() {
    let Some(app) = test_router().await else { return };
    let res = app.clone().oneshot(Request::get("/ping").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (status, body) = call(&app, Method::GET, "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let res = app.clone()
                 .oneshot(Request::get("/backup").header("Auth-Key", KEY).body(Body::empty()).unwrap())
                 .await
                 .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/tar");

    let (status, _) = call(&app, Method::GET, "/no/such/route", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sink_crud_through_http() {
    let Some(app) = test_router().await else { return };
    let (status, sink) = call(&app, Method::POST, "/sinks", Some(json!({"kind": "syslog", "config": {"url": "syslog://logs.test:514"}}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let path = format!("/sinks/{}", sink["id"].as_str().unwrap());

    let (status, fetched) = call(&app, Method::GET, &path, None).await;
    assert_eq!((status, &fetched["kind"]), (StatusCode::OK, &json!("syslog")));
    let (status, removed) = call(&app, Method::DELETE, &path, None).await;
    assert_eq!((status, &removed["id"]), (StatusCode::OK, &sink["id"]));
    let (status, body) = call(&app, Method::GET, &path, None).await;
    assert_eq!((status, &body["code"]), (StatusCode::NOT_FOUND, &json!("object_not_found")));

    let (status, _) = call(&app, Method::GET, "/sinks/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
