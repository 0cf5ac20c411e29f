use thiserror::Error;

/// Errores de dominio: reglas de validación y referencias rotas.
///
/// Las capas superiores (repositorios, API) los traducen a códigos HTTP y
/// gRPC; aquí sólo se distingue la semántica.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{field} {message}")]
    Validation { field: String, message: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation { field: field.into(),
                                  message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self { DomainError::NotFound(what.into()) }

    pub fn conflict(message: impl Into<String>) -> Self { DomainError::Conflict(message.into()) }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self { DomainError::validation("body", e.to_string()) }
}
