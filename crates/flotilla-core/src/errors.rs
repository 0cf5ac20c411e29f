//! Errores del core.

use flotilla_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)] Domain(#[from] DomainError),
    #[error("timed out: {0}")] Timeout(String),
    #[error("cancelled")] Cancelled,
    #[error("unavailable: {0}")] Unavailable(String),
    /// Fallo de un colaborador externo (scheduler, discovery, peers...).
    #[error("{0}")] Backend(String),
    #[error("internal: {0}")] Internal(String),
}

impl CoreError {
    pub fn backend(msg: impl Into<String>) -> Self { CoreError::Backend(msg.into()) }

    pub fn internal(msg: impl Into<String>) -> Self { CoreError::Internal(msg.into()) }

    pub fn is_not_found(&self) -> bool { matches!(self, CoreError::Domain(DomainError::NotFound(_))) }
}
