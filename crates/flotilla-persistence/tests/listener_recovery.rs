mod test_support;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use flotilla_core::{subscribe_with_history, EventBroker, EventFilter, EventSource, EventStore, EventSubscriber, NewEvent,
                    SubscriptionError};
use flotilla_domain::{Event, EventOp, EventType};
use flotilla_persistence::{Db, PgEventListener, PgEventStore};
use test_support::{create_app, test_db};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

// Cortar conexiones LISTEN afecta a todos los listeners del proceso.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> { SERIAL.lock().unwrap_or_else(|e| e.into_inner()) }

async fn append(store: &PgEventStore, app_id: Uuid, n: i64) -> Event {
    let ev = NewEvent::new(Some(app_id), app_id.to_string(), EventType::App, EventOp::Update, &serde_json::json!({ "n": n })).unwrap();
    store.append(ev).await.unwrap().expect("event inserted")
}

async fn next(sub: &mut EventSubscriber) -> Option<Event> { timeout(WAIT, sub.next()).await.expect("subscriber stalled") }

/// Corta la conexión dedicada del listener desde otra sesión.
async fn kill_listener_connections(db: &Arc<Db>) {
    let killed: Vec<(bool,)> = sqlx::query_as("SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                                               WHERE datname = current_database() AND pid <> pg_backend_pid() \
                                               AND query ILIKE 'LISTEN%'")
        .fetch_all(&db.pool())
        .await
        .unwrap();
    assert!(!killed.is_empty(), "no listener backend found");
}

#[tokio::test]
async fn lost_connection_closes_every_subscriber_and_history_fills_the_gap() {
    let _serial = serial();
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let store = PgEventStore::new(db.clone());
    let listener = PgEventListener::new(db.clone(), EventBroker::new());
    let filter = EventFilter::app(app.id).with_types(&[EventType::App]);

    let mut sub = listener.subscribe(filter.clone()).await.unwrap();
    let mut formations = listener.subscribe_formations().await.unwrap();
    let first = append(&store, app.id, 1).await;
    assert_eq!(next(&mut sub).await.map(|e| e.id), Some(first.id));

    kill_listener_connections(&db).await;
    assert!(next(&mut sub).await.is_none());
    assert!(matches!(sub.err(), Some(SubscriptionError::ListenerClosed(_))));
    let closed = timeout(WAIT, formations.recv()).await.expect("formation receiver left open");
    assert!(matches!(closed, Err(RecvError::Closed)));

    // Escrito con el listener caído: sólo llega por historial.
    let missed = append(&store, app.id, 2).await;
    let (history, mut sub) = subscribe_with_history(&store, listener.as_ref(), filter, Some(first.id), None).await.unwrap();
    assert_eq!(history.iter().map(|e| e.id).collect::<Vec<_>>(), vec![missed.id]);

    let live = append(&store, app.id, 3).await;
    assert_eq!(next(&mut sub).await.map(|e| e.id), Some(live.id));

    listener.shutdown().await;
}

#[tokio::test]
async fn formation_subscribers_resume_on_a_new_listener() {
    let _serial = serial();
    let Some(db) = test_db().await else { return };
    let listener = PgEventListener::new(db.clone(), EventBroker::new());
    let mut old = listener.subscribe_formations().await.unwrap();
    kill_listener_connections(&db).await;
    assert!(matches!(timeout(WAIT, old.recv()).await.expect("old receiver left open"), Err(RecvError::Closed)));

    let mut fresh = listener.subscribe_formations().await.unwrap();
    let (app_id, release_id) = (Uuid::new_v4(), Uuid::new_v4());
    sqlx::query("SELECT pg_notify('formations', $1)").bind(format!("{app_id}:{release_id}"))
                                                      .execute(&db.pool())
                                                      .await
                                                      .unwrap();
    let key = loop {
        let key = timeout(WAIT, fresh.recv()).await.expect("no formation change").unwrap();
        if key.app_id == app_id {
            break key;
        }
    };
    assert_eq!(key.release_id, release_id);
    listener.shutdown().await;
}

#[tokio::test]
async fn event_log_queries_replay_in_order() {
    let _serial = serial();
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let store = PgEventStore::new(db.clone());
    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(append(&store, app.id, n).await.id);
    }
    let listener = PgEventListener::new(db.clone(), EventBroker::new());
    let filter = EventFilter::app(app.id).with_types(&[EventType::App]);

    let (history, mut sub) = subscribe_with_history(&store, listener.as_ref(), filter.clone(), Some(ids[1]), None).await.unwrap();
    assert_eq!(history.iter().map(|e| e.id).collect::<Vec<_>>(), ids[2..].to_vec());
    let live = append(&store, app.id, 9).await;
    assert_eq!(next(&mut sub).await.map(|e| e.id), Some(live.id));

    let (limited, _) = subscribe_with_history(&store, listener.as_ref(), filter, None, Some(2)).await.unwrap();
    assert!(limited.len() == 2 && limited[0].id < limited[1].id);
    listener.shutdown().await;
}
