//! flotilla-persistence
//!
//! Capa Postgres del controller: pool con catálogo de sentencias preparadas,
//! migraciones embebidas, repositorios por entidad, log de eventos durable
//! con `LISTEN/NOTIFY` y la cola de trabajos en segundo plano.
//!
//! Módulos:
//! - `db`: pool, reinicio ante migraciones ajenas y reintentos.
//! - `queries`: catálogo de SQL con nombre.
//! - `repo`: repositorios; cada mutación emite su evento en la misma
//!   transacción.
//! - `events` / `listener`: lectura del log y difusión en vivo.
//! - `queue`: cola `que_jobs` con `SKIP LOCKED` + advisory locks.
//! - `migrations` / `config`: esquema y configuración desde `.env`.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod listener;
pub mod migrations;
pub mod queries;
pub mod queue;
pub mod repo;

pub use config::{init_dotenv, DbConfig};
pub use db::{with_retry, Db};
pub use error::PersistenceError;
pub use events::PgEventStore;
pub use listener::{FormationKey, PgEventListener};
pub use queue::{LockedJob, PgQueue};
pub use repo::*;
