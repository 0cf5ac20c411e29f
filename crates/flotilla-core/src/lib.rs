//! flotilla-core: bus de eventos en proceso, motor de despliegues y
//! contratos de la cola de trabajos.
//!
//! Nada aquí conoce Postgres ni HTTP; las implementaciones concretas de los
//! traits viven en `flotilla-persistence`, `flotilla-adapters` y
//! `flotilla-infra`.
pub mod constants;
pub mod deploy;
pub mod errors;
pub mod event;
pub mod queue;

pub use deploy::{DeployBackend, DeployContext, Deployer, DiscoveryEvent, DiscoveryEventKind, Instance, ServiceDiscovery, ServiceMeta,
                 SireniaClient, SireniaState};
pub use errors::CoreError;
pub use event::{subscribe_with_history, EventBroker, EventFilter, EventQuery, EventSource, EventStore, EventSubscriber,
                InMemoryEventStore, NewEvent, SubscriptionError};
pub use queue::{backoff, run_guarded, HandlerRegistry, JobError, JobHandler, NewQueueJob, QueueJob};
