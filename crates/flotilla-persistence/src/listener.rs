//! Listener `LISTEN events` / `LISTEN formations`.
//!
//! Singleton perezoso por proceso: la primera suscripción abre una conexión
//! dedicada (fuera del pool) y lanza la tarea de fan-out. Si la conexión se
//! pierde, todos los suscriptores se cierran: los de eventos con
//! `ListenerClosed`, los de formaciones con `RecvError::Closed` (cada
//! generación del listener tiene su propio canal). La siguiente suscripción
//! vuelve a levantar el listener.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use flotilla_core::{CoreError, EventBroker, EventFilter, EventSource, EventSubscriber, SubscriptionError};
use log::{debug, error, info, warn};
use sqlx::postgres::{PgListener, PgNotification};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::Db;
use crate::events::PgEventStore;

pub const EVENTS_CHANNEL: &str = "events";
pub const FORMATIONS_CHANNEL: &str = "formations";

const FORMATION_BUFFER: usize = 256;

/// Par `(app, release)` cuya formación cambió.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormationKey {
    pub app_id: Uuid,
    pub release_id: Uuid,
}

/// Payload de `events`: `event_id` o `event_id:app_id`.
pub fn parse_event_payload(payload: &str) -> Option<(i64, Option<Uuid>)> {
    match payload.split_once(':') {
        None => payload.parse().ok().map(|id| (id, None)),
        Some((id, app)) => Some((id.parse().ok()?, Some(Uuid::parse_str(app).ok()?))),
    }
}

/// Payload de `formations`: `app_id:release_id`.
pub fn parse_formation_payload(payload: &str) -> Option<FormationKey> {
    let (app, release) = payload.split_once(':')?;
    Some(FormationKey { app_id: Uuid::parse_str(app).ok()?,
                        release_id: Uuid::parse_str(release).ok()? })
}

/// Emisor de formaciones de una generación. La tarea lo vacía al terminar.
type FormationSlot = Arc<StdMutex<Option<broadcast::Sender<FormationKey>>>>;

struct Generation {
    task: JoinHandle<()>,
    formations: FormationSlot,
}

impl Generation {
    /// Emisor vivo, o `None` si la tarea ya terminó o está terminando.
    fn live_sender(&self) -> Option<broadcast::Sender<FormationKey>> {
        if self.task.is_finished() {
            return None;
        }
        self.formations.lock().ok().and_then(|slot| slot.clone())
    }
}

fn clear(slot: &FormationSlot) {
    if let Ok(mut slot) = slot.lock() {
        slot.take();
    }
}

pub struct PgEventListener {
    db: Arc<Db>,
    store: PgEventStore,
    broker: Arc<EventBroker>,
    generation: Mutex<Option<Generation>>,
}

impl PgEventListener {
    pub fn new(db: Arc<Db>, broker: Arc<EventBroker>) -> Arc<Self> {
        Arc::new(Self { store: PgEventStore::new(Arc::clone(&db)),
                        db,
                        broker,
                        generation: Mutex::new(None) })
    }

    pub fn broker(&self) -> &Arc<EventBroker> { &self.broker }

    /// Cambios de formaciones en vivo. El receptor ve `Closed` si se pierde
    /// la conexión del listener.
    pub async fn subscribe_formations(&self) -> Result<broadcast::Receiver<FormationKey>, CoreError> {
        Ok(self.ensure_running().await?.subscribe())
    }

    /// Levanta el listener si no está corriendo y devuelve el emisor de
    /// formaciones de la generación actual.
    async fn ensure_running(&self) -> Result<broadcast::Sender<FormationKey>, CoreError> {
        let mut current = self.generation.lock().await;
        if let Some(sender) = current.as_ref().and_then(Generation::live_sender) {
            return Ok(sender);
        }
        let mut listener = PgListener::connect_with(&self.db.pool()).await
                                                                     .map_err(|e| CoreError::Unavailable(format!("event listener: {e}")))?;
        listener.listen_all([EVENTS_CHANNEL, FORMATIONS_CHANNEL])
                .await
                .map_err(|e| CoreError::Unavailable(format!("event listener: {e}")))?;
        info!("listener:start channels={EVENTS_CHANNEL},{FORMATIONS_CHANNEL}");
        let (sender, _) = broadcast::channel(FORMATION_BUFFER);
        let formations: FormationSlot = Arc::new(StdMutex::new(Some(sender.clone())));
        let task = tokio::spawn(run(listener, self.store.clone(), Arc::clone(&self.broker), Arc::clone(&formations)));
        *current = Some(Generation { task, formations });
        Ok(sender)
    }

    /// Detiene el listener y cierra a todos los suscriptores.
    pub async fn shutdown(&self) {
        if let Some(generation) = self.generation.lock().await.take() {
            generation.task.abort();
            clear(&generation.formations);
        }
        self.broker.close_all(SubscriptionError::ListenerClosed("shutting down".into()));
    }
}

#[async_trait]
impl EventSource for PgEventListener {
    async fn subscribe(&self, filter: EventFilter) -> Result<EventSubscriber, CoreError> {
        self.ensure_running().await?;
        Ok(self.broker.subscribe(filter))
    }
}

async fn run(mut listener: PgListener, store: PgEventStore, broker: Arc<EventBroker>, slot: FormationSlot) {
    let Some(formations) = slot.lock().ok().and_then(|s| s.clone()) else {
        return;
    };
    let reason = loop {
        match listener.try_recv().await {
            Ok(Some(n)) => dispatch(&n, &store, &broker, &formations).await,
            Ok(None) => {
                warn!("listener:connection_lost");
                break "connection lost".to_string();
            }
            Err(e) => {
                error!("listener:error error={e}");
                break e.to_string();
            }
        }
    };
    // Sin emisores vivos los receptores de formaciones ven `Closed`.
    clear(&slot);
    drop(formations);
    broker.close_all(SubscriptionError::ListenerClosed(reason));
}

async fn dispatch(n: &PgNotification,
                  store: &PgEventStore,
                  broker: &EventBroker,
                  formations: &broadcast::Sender<FormationKey>) {
    match n.channel() {
        EVENTS_CHANNEL => {
            let Some((id, _app)) = parse_event_payload(n.payload()) else {
                warn!("listener:bad_payload channel=events payload={}", n.payload());
                return;
            };
            match store.fetch(id).await {
                Ok(event) => {
                    debug!("listener:event id={id} type={}", event.object_type);
                    broker.notify(&event);
                }
                Err(e) => error!("listener:fetch id={id} error={e}"),
            }
        }
        FORMATIONS_CHANNEL => match parse_formation_payload(n.payload()) {
            // Sin receptores el envío falla; no es un error.
            Some(key) => {
                let _ = formations.send(key);
            }
            None => warn!("listener:bad_payload channel=formations payload={}", n.payload()),
        },
        other => debug!("listener:ignored channel={other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payloads() {
        let app = Uuid::new_v4();
        assert_eq!(parse_event_payload("42"), Some((42, None)));
        assert_eq!(parse_event_payload(&format!("7:{app}")), Some((7, Some(app))));
        assert_eq!(parse_event_payload("x"), None);
        assert_eq!(parse_event_payload("7:nope"), None);
    }

    #[test]
    fn formation_payloads() {
        let (a, r) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(parse_formation_payload(&format!("{a}:{r}")),
                   Some(FormationKey { app_id: a,
                                       release_id: r }));
        assert_eq!(parse_formation_payload("only-one"), None);
    }
}
