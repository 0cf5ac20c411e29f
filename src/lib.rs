//! Flotilla: control plane del cluster.
//!
//! El binario `controller` lee `ControllerConfig`, arma el contexto de
//! infraestructura y sirve la API HTTP/gRPC junto a los workers de la cola.
//!
//! - `config`: variables de entorno y su validación.
//! - `errors`: `ConfigError` y `ControllerError`.
//! - `startup`: logging, wiring y ciclo de vida del proceso.

pub mod config;
pub mod errors;
pub mod startup;

pub use config::ControllerConfig;
pub use errors::{ConfigError, ControllerError};
