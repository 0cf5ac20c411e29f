//! Errores de persistencia.
//! Mapea errores de sqlx / conexión a variantes semánticas, clasificando por
//! SQLSTATE sin exponer el driver a las capas superiores.

use flotilla_core::CoreError;
use flotilla_domain::DomainError;
use thiserror::Error;

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("config: {0}")]
    Config(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    pub fn is_unique_violation(&self) -> bool { matches!(self, Self::UniqueViolation(_)) }

    pub fn is_check_violation(&self) -> bool { matches!(self, Self::CheckViolation(_)) }

    /// Fallos que merecen reintento: conflictos de serialización y cortes de
    /// conexión.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::SerializationConflict | Self::TransientIo(_)) }

    /// Clasifica por SQLSTATE. Los `RAISE EXCEPTION` sin `ERRCODE` (P0001)
    /// y cualquier otro código quedan como `Unknown`.
    pub fn from_sqlstate(code: Option<&str>, msg: String) -> Self {
        match code {
            Some(UNIQUE_VIOLATION) => Self::UniqueViolation(msg),
            Some(CHECK_VIOLATION) => Self::CheckViolation(msg),
            Some(FOREIGN_KEY_VIOLATION) => Self::ForeignKeyViolation(msg),
            Some(SERIALIZATION_FAILURE) => Self::SerializationConflict,
            Some(code) => Self::Unknown(format!("{code}: {msg}")),
            None => Self::Unknown(msg),
        }
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) => Self::from_sqlstate(db.code().as_deref(), db.message().to_string()),
            sqlx::Error::Io(e) => Self::TransientIo(e.to_string()),
            sqlx::Error::PoolTimedOut => Self::TransientIo("pool timed out".into()),
            sqlx::Error::PoolClosed => Self::TransientIo("pool closed".into()),
            sqlx::Error::WorkerCrashed => Self::TransientIo("connection worker crashed".into()),
            sqlx::Error::ColumnDecode { index, source } => Self::Decode(format!("column {index}: {source}")),
            sqlx::Error::Decode(e) => Self::Decode(e.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self { Self::Decode(err.to_string()) }
}

impl From<PersistenceError> for CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Domain(e) => CoreError::Domain(e),
            PersistenceError::NotFound => CoreError::Domain(DomainError::not_found("record")),
            PersistenceError::TransientIo(msg) => CoreError::Unavailable(msg),
            PersistenceError::SerializationConflict => CoreError::Unavailable("serialization conflict".into()),
            PersistenceError::UniqueViolation(msg) => CoreError::Domain(DomainError::conflict(msg)),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classification() {
        assert!(PersistenceError::from_sqlstate(Some("23505"), "dup".into()).is_unique_violation());
        assert!(PersistenceError::from_sqlstate(Some("23514"), "check".into()).is_check_violation());
        assert!(PersistenceError::from_sqlstate(Some("40001"), "retry".into()).is_retryable());
        assert!(matches!(PersistenceError::from_sqlstate(Some("23503"), "fk".into()),
                         PersistenceError::ForeignKeyViolation(_)));
    }

    #[test]
    fn plpgsql_raise_is_not_a_check_violation() {
        let err = PersistenceError::from_sqlstate(Some("P0001"), "trigger said no".into());
        assert!(!err.is_check_violation());
        assert_eq!(err.to_string(), "unknown database error: P0001: trigger said no");
        assert!(matches!(CoreError::from(err), CoreError::Internal(_)));
    }
}
