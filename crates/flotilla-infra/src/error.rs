//! Errores de la capa de cableado.

use flotilla_adapters::AdapterError;
use flotilla_core::{CoreError, JobError};
use flotilla_persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("archive: {0}")]
    Archive(#[from] std::io::Error),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<InfraError> for CoreError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Persistence(e) => e.into(),
            InfraError::Adapter(e) => e.into(),
            InfraError::Core(e) => e,
            other => CoreError::Internal(other.to_string()),
        }
    }
}

impl From<InfraError> for JobError {
    fn from(err: InfraError) -> Self { JobError::new(err.to_string()) }
}

pub type Result<T> = std::result::Result<T, InfraError>;
