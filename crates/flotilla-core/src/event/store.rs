use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use flotilla_domain::{DomainError, Event, EventOp, EventType};
use uuid::Uuid;

use super::{EventBroker, EventFilter, EventQuery, EventSubscriber};
use crate::errors::CoreError;

/// Evento a insertar. `unique_id` hace la emisión idempotente: un segundo
/// insert con la misma clave es un no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub app_id: Option<Uuid>,
    pub object_id: String,
    pub object_type: EventType,
    pub op: EventOp,
    pub unique_id: Option<String>,
    pub data: serde_json::Value,
}

impl NewEvent {
    pub fn new<T: serde::Serialize>(app_id: Option<Uuid>,
                                    object_id: impl Into<String>,
                                    object_type: EventType,
                                    op: EventOp,
                                    data: &T)
                                    -> Result<Self, CoreError> {
        let data = serde_json::to_value(data).map_err(|e| CoreError::internal(format!("encode event data: {e}")))?;
        Ok(Self { app_id,
                  object_id: object_id.into(),
                  object_type,
                  op,
                  unique_id: None,
                  data })
    }

    pub fn unique(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }
}

/// Almacenamiento append-only de eventos.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserta un evento. Devuelve `None` si `unique_id` ya existía.
    async fn append(&self, event: NewEvent) -> Result<Option<Event>, CoreError>;
    async fn get(&self, id: i64) -> Result<Event, CoreError>;
    async fn list(&self, query: &EventQuery) -> Result<Vec<Event>, CoreError>;
}

/// Abre suscripciones en vivo.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self, filter: EventFilter) -> Result<EventSubscriber, CoreError>;
}

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    unique_ids: HashSet<String>,
}

/// Implementación en memoria: ids consecutivos desde 1, notificación
/// inmediata al broker tras cada append.
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
    broker: Arc<EventBroker>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner::default()),
               broker: EventBroker::new() }
    }
}

impl InMemoryEventStore {
    pub fn new(broker: Arc<EventBroker>) -> Self {
        Self { inner: Mutex::new(Inner::default()),
               broker }
    }

    pub fn broker(&self) -> &Arc<EventBroker> { &self.broker }

    pub fn len(&self) -> usize { self.inner.lock().map(|i| i.events.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, new: NewEvent) -> Result<Option<Event>, CoreError> {
        let event = {
            let mut inner = self.inner.lock().map_err(|_| CoreError::internal("event store lock poisoned"))?;
            if let Some(uid) = &new.unique_id {
                if !inner.unique_ids.insert(uid.clone()) {
                    return Ok(None);
                }
            }
            let event = Event { id: inner.events.len() as i64 + 1,
                                app_id: new.app_id,
                                object_id: new.object_id,
                                object_type: new.object_type,
                                op: new.op,
                                data: new.data,
                                created_at: Utc::now() };
            inner.events.push(event.clone());
            event
        };
        self.broker.notify(&event);
        Ok(Some(event))
    }

    async fn get(&self, id: i64) -> Result<Event, CoreError> {
        let inner = self.inner.lock().map_err(|_| CoreError::internal("event store lock poisoned"))?;
        inner.events
             .iter()
             .find(|e| e.id == id)
             .cloned()
             .ok_or_else(|| DomainError::not_found(format!("event {id}")).into())
    }

    async fn list(&self, query: &EventQuery) -> Result<Vec<Event>, CoreError> {
        let inner = self.inner.lock().map_err(|_| CoreError::internal("event store lock poisoned"))?;
        let mut out: Vec<Event> = inner.events
                                       .iter()
                                       .filter(|e| query.filter.matches(e))
                                       .filter(|e| query.since_id.map(|s| e.id > s).unwrap_or(true))
                                       .filter(|e| query.before_id.map(|b| e.id < b).unwrap_or(true))
                                       .cloned()
                                       .collect();
        if !query.ascending {
            out.reverse();
        }
        if let Some(n) = query.count {
            out.truncate(n.max(0) as usize);
        }
        Ok(out)
    }
}

#[async_trait]
impl EventSource for InMemoryEventStore {
    async fn subscribe(&self, filter: EventFilter) -> Result<EventSubscriber, CoreError> { Ok(self.broker.subscribe(filter)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event(app: Option<Uuid>, uid: Option<&str>) -> NewEvent {
        let mut ev = NewEvent::new(app, "obj", EventType::Job, EventOp::Create, &serde_json::json!({})).unwrap();
        if let Some(u) = uid {
            ev = ev.unique(u);
        }
        ev
    }

    #[tokio::test]
    async fn unique_id_emits_once() {
        let store = InMemoryEventStore::default();
        assert!(store.append(new_event(None, Some("k"))).await.unwrap().is_some());
        assert!(store.append(new_event(None, Some("k"))).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_listing_respects_bounds() {
        let store = InMemoryEventStore::default();
        for _ in 0..5 {
            store.append(new_event(None, None)).await.unwrap();
        }
        let q = EventQuery { since_id: Some(1),
                             before_id: Some(5),
                             ascending: true,
                             ..EventQuery::default() };
        let ids: Vec<i64> = store.list(&q).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        let latest = store.list(&EventQuery { count: Some(2), ..EventQuery::default() }).await.unwrap();
        assert_eq!(latest.iter().map(|e| e.id).collect::<Vec<_>>(), vec![5, 4]);
    }
}
