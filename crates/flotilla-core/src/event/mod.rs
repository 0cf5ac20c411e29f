//! Event log y fan-out a suscriptores.
//!
//! - `EventStore`: lectura/escritura del log append-only.
//! - `EventBroker`: registro de suscriptores y entrega filtrada.
//! - `EventSource`: abre suscripciones en vivo (listener Postgres o memoria).
//! - `subscribe_with_history`: replay + stream sin duplicados en la costura.

mod broker;
mod filter;
mod replay;
mod store;
mod subscriber;

pub use broker::EventBroker;
pub use filter::{EventFilter, EventQuery};
pub use replay::subscribe_with_history;
pub use store::{EventSource, EventStore, InMemoryEventStore, NewEvent};
pub use subscriber::{EventSubscriber, SubscriptionError};
