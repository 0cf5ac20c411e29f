//! Registro de suscriptores y fan-out.
//!
//! Los suscriptores se indexan por app (`None` = todas las apps). El fan-out
//! toma el lock de lectura; sólo `subscribe`/`unsubscribe` escriben. La
//! entrega nunca bloquea a la fuente: si el buffer de un suscriptor está
//! lleno, ese suscriptor se cierra con `BufferOverflow` y el resto sigue.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use flotilla_domain::Event;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::{EventFilter, EventSubscriber, SubscriptionError};
use crate::constants::EVENT_BUFFER_SIZE;

struct Slot {
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
    error: Arc<Mutex<Option<SubscriptionError>>>,
}

impl Slot {
    fn fail(&self, err: SubscriptionError) {
        if let Ok(mut guard) = self.error.lock() {
            if guard.is_none() {
                *guard = Some(err);
            }
        }
    }
}

type SlotMap = HashMap<Option<Uuid>, HashMap<u64, Slot>>;

pub struct EventBroker {
    subscribers: RwLock<SlotMap>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for EventBroker {
    fn default() -> Self { Self::with_buffer(EVENT_BUFFER_SIZE) }
}

impl EventBroker {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn with_buffer(buffer: usize) -> Self {
        Self { subscribers: RwLock::new(HashMap::new()),
               next_id: AtomicU64::new(1),
               buffer: buffer.max(1) }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SlotMap> {
        self.subscribers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SlotMap> {
        self.subscribers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(self: &Arc<Self>, filter: EventFilter) -> EventSubscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let error = Arc::new(Mutex::new(None));
        let slot = Slot { filter: filter.clone(),
                          tx,
                          error: error.clone() };
        self.write().entry(filter.app_id).or_default().insert(id, slot);
        debug!("subscribe id={id} app={:?} types={:?}", filter.app_id, filter.object_types);
        EventSubscriber::new(id, filter, rx, error, Arc::downgrade(self))
    }

    pub(crate) fn unsubscribe(&self, app_id: Option<Uuid>, id: u64) {
        let mut subs = self.write();
        if let Some(slots) = subs.get_mut(&app_id) {
            if slots.remove(&id).is_some() {
                debug!("unsubscribe id={id} app={app_id:?}");
            }
            if slots.is_empty() {
                subs.remove(&app_id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize { self.read().values().map(HashMap::len).sum() }

    /// Entrega `event` a cada suscriptor cuyo filtro coincida.
    pub fn notify(&self, event: &Event) {
        let mut dropped: Vec<(Option<Uuid>, u64)> = Vec::new();
        {
            let subs = self.read();
            let keys = [None, event.app_id];
            let scopes = if event.app_id.is_some() { &keys[..] } else { &keys[..1] };
            for key in scopes {
                let Some(slots) = subs.get(key) else { continue };
                for (id, slot) in slots {
                    if !slot.filter.matches(event) {
                        continue;
                    }
                    match slot.tx.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("subscriber buffer overflow id={id} event_id={}", event.id);
                            slot.fail(SubscriptionError::BufferOverflow);
                            dropped.push((*key, *id));
                        }
                        Err(TrySendError::Closed(_)) => dropped.push((*key, *id)),
                    }
                }
            }
        }
        for (app, id) in dropped {
            self.unsubscribe(app, id);
        }
    }

    /// Cierra todas las suscripciones con un error terminal (pérdida de la
    /// conexión del listener).
    pub fn close_all(&self, err: SubscriptionError) {
        let mut subs = self.write();
        let n: usize = subs.values().map(HashMap::len).sum();
        for slots in subs.values() {
            for slot in slots.values() {
                slot.fail(err.clone());
            }
        }
        subs.clear();
        if n > 0 {
            warn!("closed {n} subscribers: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flotilla_domain::{EventOp, EventType};

    fn event(id: i64, app: Option<Uuid>) -> Event {
        Event { id,
                app_id: app,
                object_id: format!("o{id}"),
                object_type: EventType::App,
                op: EventOp::Create,
                data: serde_json::Value::Null,
                created_at: Utc::now() }
    }

    #[tokio::test]
    async fn app_scoped_and_global_subscribers() {
        let broker = EventBroker::new();
        let app = Uuid::new_v4();
        let mut global = broker.subscribe(EventFilter::default());
        let mut scoped = broker.subscribe(EventFilter::app(app));
        let mut other = broker.subscribe(EventFilter::app(Uuid::new_v4()));

        broker.notify(&event(1, Some(app)));
        broker.notify(&event(2, None));

        assert_eq!(global.next().await.map(|e| e.id), Some(1));
        assert_eq!(global.next().await.map(|e| e.id), Some(2));
        assert_eq!(scoped.next().await.map(|e| e.id), Some(1));
        broker.close_all(SubscriptionError::ListenerClosed("test".into()));
        assert_eq!(scoped.next().await, None);
        assert_eq!(other.next().await, None);
        assert!(matches!(other.err(), Some(SubscriptionError::ListenerClosed(_))));
    }

    #[tokio::test]
    async fn overflow_closes_only_the_slow_subscriber() {
        let broker = Arc::new(EventBroker::with_buffer(2));
        let mut slow = broker.subscribe(EventFilter::default());
        let mut fast = broker.subscribe(EventFilter::default());
        for id in 1..=2 {
            broker.notify(&event(id, None));
        }
        assert_eq!(fast.next().await.map(|e| e.id), Some(1));
        assert_eq!(fast.next().await.map(|e| e.id), Some(2));
        broker.notify(&event(3, None));
        assert_eq!(fast.next().await.map(|e| e.id), Some(3));

        // slow todavía puede drenar lo que ya tenía en buffer
        assert_eq!(slow.next().await.map(|e| e.id), Some(1));
        assert_eq!(slow.next().await.map(|e| e.id), Some(2));
        assert_eq!(slow.next().await, None);
        assert_eq!(slow.err(), Some(SubscriptionError::BufferOverflow));
        assert_eq!(broker.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let broker = EventBroker::new();
        let sub = broker.subscribe(EventFilter::default());
        assert_eq!(broker.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count(), 0);
    }
}
