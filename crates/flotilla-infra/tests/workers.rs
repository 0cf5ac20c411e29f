use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use flotilla_adapters::{BlobstoreClient, RouterClient};
use flotilla_core::{CoreError, EventBroker, EventFilter, EventSource, EventStore, EventSubscriber, InMemoryEventStore, JobHandler,
                    NewEvent, QueueJob};
use flotilla_domain::{BackupStatus, Deployment, DeploymentEvent, DeploymentStatus, EventOp, EventType, Route};
use flotilla_infra::deployer::watch_cancellation;
use flotilla_infra::{BackupWriter, ClusterBackupHandler, DomainMigrationHandler};
use flotilla_persistence::{BackupRepo, Db, DbConfig, DomainMigrationRepo, FormationRepo, PgEventStore, CLUSTER_BACKUP_JOB_CLASS,
                           DOMAIN_MIGRATION_JOB_CLASS};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct BrokerSource(Arc<EventBroker>);

#[async_trait]
impl EventSource for BrokerSource {
    async fn subscribe(&self, filter: EventFilter) -> Result<EventSubscriber, CoreError> { Ok(self.0.subscribe(filter)) }
}

fn deployment() -> Deployment {
    Deployment { id: Uuid::new_v4(),
                 app_id: Uuid::new_v4(),
                 new_release_id: Uuid::new_v4(),
                 ..Deployment::default() }
}

async fn publish(store: &InMemoryEventStore, d: &Deployment, status: DeploymentStatus) {
    let mut ev = DeploymentEvent::status(d.new_release_id, status);
    ev.app_id = d.app_id;
    ev.deployment_id = d.id;
    let new = NewEvent::new(Some(d.app_id), d.id.to_string(), EventType::Deployment, EventOp::Update, &ev).unwrap();
    store.append(new).await.unwrap();
}

#[tokio::test]
async fn cancellation_recorded_before_start_cancels_immediately() {
    let broker = EventBroker::new();
    let store = InMemoryEventStore::new(broker.clone());
    let source = BrokerSource(broker);
    let d = deployment();
    publish(&store, &d, DeploymentStatus::Cancelled).await;

    let cancel = CancellationToken::new();
    let watcher = watch_cancellation(&store, &source, &d, cancel.clone()).await.unwrap();
    assert!(cancel.is_cancelled());
    watcher.abort();
}

#[tokio::test]
async fn live_cancellation_cancels_the_token() {
    let broker = EventBroker::new();
    let store = InMemoryEventStore::new(broker.clone());
    let source = BrokerSource(broker);
    let d = deployment();
    let other = deployment();

    let cancel = CancellationToken::new();
    let _watcher = watch_cancellation(&store, &source, &d, cancel.clone()).await.unwrap();
    publish(&store, &d, DeploymentStatus::Running).await;
    publish(&store, &other, DeploymentStatus::Cancelled).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!cancel.is_cancelled());

    publish(&store, &d, DeploymentStatus::Cancelled).await;
    tokio::time::timeout(Duration::from_secs(2), cancel.cancelled()).await.expect("cancelled");
}

async fn test_db() -> Option<Arc<Db>> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return None;
    }
    let mut cfg = DbConfig::from_env().ok()?;
    cfg.max_connections = 4;
    match Db::connect(cfg).await {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!("No se pudo abrir la base de test: {e}");
            None
        }
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn queue_job(class: &str, args: serde_json::Value) -> QueueJob {
    QueueJob { id: 0,
               queue: "default".into(),
               priority: 0,
               run_at: Utc::now(),
               class: class.into(),
               args,
               error_count: 0,
               last_error: None }
}

type Blobs = Arc<Mutex<HashMap<String, Vec<u8>>>>;

#[tokio::test]
async fn cluster_backup_uploads_tar_and_records_digest() {
    let Some(db) = test_db().await else { return };
    let blobs: Blobs = Arc::default();
    let app = Router::new().route("/*path",
                                  put(|State(blobs): State<Blobs>, Path(path): Path<String>, body: Bytes| async move {
                                      blobs.lock().unwrap().insert(path, body.to_vec());
                                      StatusCode::OK
                                  }))
                           .with_state(blobs.clone());
    let blobstore = BlobstoreClient::new(serve(app).await);

    let backups = BackupRepo::new(db.clone());
    let backup = backups.schedule().await.unwrap();
    assert_eq!(backup.status, BackupStatus::Running);

    let writer = BackupWriter::new(FormationRepo::new(db.clone()), PgEventStore::new(db.clone()));
    let handler = ClusterBackupHandler::new(writer, BackupRepo::new(db.clone()), blobstore);
    handler.run(&queue_job(CLUSTER_BACKUP_JOB_CLASS, json!({"id": backup.id})))
           .await
           .unwrap();

    let done = backups.get(backup.id).await.unwrap();
    assert_eq!(done.status, BackupStatus::Complete);
    assert!(done.completed_at.is_some());
    let blobs = blobs.lock().unwrap();
    let body = blobs.get(&format!("backups/{}.tar", backup.id)).expect("uploaded");
    assert_eq!(done.size, Some(body.len() as i64));
    assert_eq!(done.sha512.as_deref().map(str::len), Some(128));
}

type Routes = Arc<Mutex<Vec<Route>>>;

#[tokio::test]
async fn domain_migration_adds_routes_and_finishes() {
    let Some(db) = test_db().await else { return };
    let repo = DomainMigrationRepo::new(db.clone(), "old.flotilla.test");
    let domain = format!("{}.flotilla.test", Uuid::new_v4().simple());
    let dm = repo.add(&domain).await.unwrap();

    let parent = Route::app_parent_ref(Uuid::new_v4());
    let existing = Route { route_type: "http".into(),
                           id: "http/1".into(),
                           parent_ref: parent.clone(),
                           service: "web".into(),
                           domain: Some(format!("web.{}", dm.old_domain)),
                           ..Route::default() };
    let routes: Routes = Arc::new(Mutex::new(vec![existing]));
    let app = Router::new().route("/routes",
                                  get(|State(routes): State<Routes>| async move { Json(routes.lock().unwrap().clone()) }).post(
                                      |State(routes): State<Routes>, Json(mut route): Json<Route>| async move {
                                          let mut routes = routes.lock().unwrap();
                                          route.id = format!("http/{}", routes.len() + 1);
                                          routes.push(route.clone());
                                          Json(route)
                                      },
                                  ))
                           .with_state(routes.clone());
    let handler = DomainMigrationHandler::new(DomainMigrationRepo::new(db.clone(), "old.flotilla.test"), RouterClient::new(serve(app).await));
    handler.run(&queue_job(DOMAIN_MIGRATION_JOB_CLASS, json!({"id": dm.id}))).await.unwrap();

    let routes = routes.lock().unwrap().clone();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[1].domain.as_deref(), Some(format!("web.{domain}").as_str()));
    assert_eq!(routes[1].parent_ref, parent);
    assert!(repo.get(dm.id).await.unwrap().finished_at.is_some());
}
