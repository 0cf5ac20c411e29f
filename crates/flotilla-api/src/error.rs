//! Errores de la superficie HTTP/gRPC.
//!
//! Todas las capas convergen en `ApiError`. El cuerpo JSON tiene la forma
//! `{"code", "message", "detail"?, "retry"}`; un 401 va sin cuerpo.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flotilla_adapters::AdapterError;
use flotilla_core::CoreError;
use flotilla_domain::DomainError;
use flotilla_infra::InfraError;
use flotilla_persistence::PersistenceError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{field} {message}")]
    Validation { field: String, message: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthenticated,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("cancelled")]
    Cancelled,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
    retry: bool,
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation { field: field.into(),
                               message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self { ApiError::NotFound(what.into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } | ApiError::Conflict(_) => "validation_error",
            ApiError::NotFound(_) => "object_not_found",
            ApiError::Unauthenticated => "unauthorized",
            ApiError::Timeout(_) | ApiError::Cancelled => "unknown_error",
            ApiError::Unavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "unknown_error",
        }
    }

    fn body(&self) -> ErrorBody<'static> {
        let detail = match self {
            ApiError::Validation { field, .. } => Some(json!({ "field": field })),
            _ => None,
        };
        let message = match self {
            // los internos no exponen detalles al cliente
            ApiError::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        };
        ErrorBody { code: self.code(),
                    message,
                    detail,
                    retry: matches!(self, ApiError::Unavailable(_)) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::UNAUTHORIZED {
            return status.into_response();
        }
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<ApiError> for tonic::Status {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match err {
            ApiError::Validation { .. } => tonic::Status::invalid_argument(message),
            ApiError::NotFound(_) => tonic::Status::not_found(message),
            ApiError::Conflict(_) => tonic::Status::failed_precondition(message),
            ApiError::Unauthenticated => tonic::Status::unauthenticated(message),
            ApiError::Timeout(_) => tonic::Status::deadline_exceeded(message),
            ApiError::Cancelled => tonic::Status::cancelled(message),
            ApiError::Unavailable(_) => tonic::Status::unavailable(message),
            ApiError::Internal(_) => {
                tracing::error!(error = %message, "rpc failed");
                tonic::Status::unknown(message)
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => ApiError::Validation { field, message },
            DomainError::NotFound(what) => ApiError::NotFound(what),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Domain(e) => e.into(),
            CoreError::Timeout(msg) => ApiError::Timeout(msg),
            CoreError::Cancelled => ApiError::Cancelled,
            CoreError::Unavailable(msg) => ApiError::Unavailable(msg),
            CoreError::Backend(msg) | CoreError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::CheckViolation(msg) => ApiError::validation("body", msg),
            PersistenceError::ForeignKeyViolation(_) => ApiError::not_found("referenced object"),
            other => CoreError::from(other).into(),
        }
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self { CoreError::from(err).into() }
}

impl From<InfraError> for ApiError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Persistence(e) => e.into(),
            InfraError::Adapter(e) => e.into(),
            other => CoreError::from(other).into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self { ApiError::validation("body", err.to_string()) }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_bad_requests_with_validation_body() {
        let err = ApiError::from(DomainError::conflict("app has an unfinished deployment"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body().code, "validation_error");
        assert_eq!(tonic::Status::from(err).code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn grpc_codes_follow_error_kind() {
        let cases = [(ApiError::validation("name", "is invalid"), tonic::Code::InvalidArgument),
                     (ApiError::not_found("app"), tonic::Code::NotFound),
                     (ApiError::Unauthenticated, tonic::Code::Unauthenticated),
                     (ApiError::Timeout("deploy".into()), tonic::Code::DeadlineExceeded),
                     (ApiError::Cancelled, tonic::Code::Cancelled),
                     (ApiError::Unavailable("db".into()), tonic::Code::Unavailable),
                     (ApiError::Internal("boom".into()), tonic::Code::Unknown)];
        for (err, code) in cases {
            assert_eq!(tonic::Status::from(err).code(), code);
        }
    }

    #[test]
    fn persistence_not_found_is_a_404() {
        let err = ApiError::from(PersistenceError::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = ApiError::from(PersistenceError::TransientIo("pool closed".into()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.body().retry);
    }

    #[test]
    fn internal_messages_are_not_leaked() {
        let body = ApiError::Internal("password=hunter2".into()).body();
        assert!(!body.message.contains("hunter2"));
    }
}
