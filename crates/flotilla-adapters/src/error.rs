//! Errores de los clientes HTTP.

use flotilla_core::CoreError;
use flotilla_domain::DomainError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Fallo de transporte (conexión, timeout, cuerpo truncado).
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Protocolo de attach: estado desconocido, error del host o espera
    /// no permitida.
    #[error("attach: {0}")]
    Attach(String),
}

impl AdapterError {
    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

    /// Convierte una respuesta no exitosa, usando el campo `message` del
    /// cuerpo JSON si existe.
    pub(crate) fn from_response(status: StatusCode, body: &[u8], what: &str) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body).ok()
                                                                       .and_then(|v| {
                                                                           v.get("message")
                                                                            .and_then(|m| m.as_str())
                                                                            .map(str::to_string)
                                                                       })
                                                                       .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        match status {
            StatusCode::NOT_FOUND => Self::NotFound(what.to_string()),
            _ => Self::Status { status, message },
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self { Self::Decode(e.to_string()) }
}

/// Los 4xx de un colaborador se reflejan como errores de dominio para que la
/// API los devuelva con el mismo código.
impl From<AdapterError> for CoreError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::NotFound(what) => CoreError::Domain(DomainError::NotFound(what)),
            AdapterError::Status { status, message } if status == StatusCode::CONFLICT => {
                CoreError::Domain(DomainError::Conflict(message))
            }
            AdapterError::Status { status, message } if status == StatusCode::BAD_REQUEST => {
                CoreError::Domain(DomainError::validation("body", message))
            }
            AdapterError::Status { status, message } if status.is_server_error() => {
                CoreError::Unavailable(format!("{status}: {message}"))
            }
            other => CoreError::backend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_field_is_preferred() {
        let e = AdapterError::from_response(StatusCode::BAD_REQUEST, br#"{"message":"bad route"}"#, "route");
        match e {
            AdapterError::Status { message, .. } => assert_eq!(message, "bad route"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn not_found_maps_to_domain_not_found() {
        let e = AdapterError::from_response(StatusCode::NOT_FOUND, b"", "route");
        assert!(e.is_not_found());
        assert!(CoreError::from(e).is_not_found());
    }

    #[test]
    fn conflict_maps_to_domain_conflict() {
        let e = AdapterError::from_response(StatusCode::CONFLICT, b"duplicate", "route");
        assert_eq!(CoreError::from(e), CoreError::Domain(DomainError::Conflict("duplicate".into())));
    }
}
