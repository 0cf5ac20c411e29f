use std::sync::{Arc, Mutex, Weak};

use flotilla_domain::Event;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::broker::EventBroker;
use super::EventFilter;

/// Error terminal de una suscripción. El cliente debe reabrirla.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("event stream buffer overflow")]
    BufferOverflow,
    #[error("event listener closed: {0}")]
    ListenerClosed(String),
}

/// Stream filtrado de eventos entregado a un cliente.
///
/// Contrato:
/// - Orden por `event_id` creciente dentro de la suscripción.
/// - `next()` devuelve `None` cuando la suscripción terminó; `err()` indica
///   si fue por un fallo terminal o por cierre normal.
/// - Eventos con id ≤ `skip_through` se descartan (costura list/stream).
pub struct EventSubscriber {
    pub(crate) id: u64,
    pub(crate) filter: EventFilter,
    rx: mpsc::Receiver<Event>,
    error: Arc<Mutex<Option<SubscriptionError>>>,
    broker: Weak<EventBroker>,
    last_id: i64,
}

impl EventSubscriber {
    pub(crate) fn new(id: u64,
                      filter: EventFilter,
                      rx: mpsc::Receiver<Event>,
                      error: Arc<Mutex<Option<SubscriptionError>>>,
                      broker: Weak<EventBroker>)
                      -> Self {
        Self { id,
               filter,
               rx,
               error,
               broker,
               last_id: 0 }
    }

    pub fn filter(&self) -> &EventFilter { &self.filter }

    pub fn app_id(&self) -> Option<Uuid> { self.filter.app_id }

    /// Descarta los eventos con id menor o igual a `id`.
    pub fn skip_through(&mut self, id: i64) {
        if id > self.last_id {
            self.last_id = id;
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        loop {
            let event = self.rx.recv().await?;
            if event.id <= self.last_id {
                continue;
            }
            self.last_id = event.id;
            return Some(event);
        }
    }

    /// Error terminal, si lo hubo.
    pub fn err(&self) -> Option<SubscriptionError> { self.error.lock().map(|e| e.clone()).unwrap_or(None) }

    /// Desengancha la suscripción y vacía el buffer pendiente.
    pub fn close(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.unsubscribe(self.filter.app_id, self.id);
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.unsubscribe(self.filter.app_id, self.id);
        }
    }
}
