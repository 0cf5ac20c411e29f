use flotilla_domain::DomainError;
use flotilla_persistence::PersistenceError;
use thiserror::Error;

/// Configuración inválida o incompleta.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },
    #[error("AUTH_KEY has {keys} entries but AUTH_KEY_IDS has {ids}")]
    AuthKeyMismatch { keys: usize, ids: usize },
}

/// Errores de arranque del binario.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
