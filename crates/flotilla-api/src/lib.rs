//! Superficie HTTP/JSON (axum) y gRPC (tonic) del controlador.
//!
//! Ambas comparten un único `Router`: autorización por clave, logging de
//! peticiones con el id de la clave en el span, recuperación de panics y,
//! opcionalmente, auditoría de bodies con redacción de secretos.

pub mod audit;
pub mod auth;
pub mod error;
pub mod grpc;
pub mod routes;
pub mod sse;
pub mod state;

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use auth::{AuthKeys, KeyId};
pub use error::ApiError;
pub use state::{ApiConfig, ApiState};

/// Prefijo de las rutas gRPC del servicio.
pub const GRPC_PATH: &str = "/flotilla.controller.v1.Controller/*rpc";

async fn fallback() -> ApiError { ApiError::not_found("route") }

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err.downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| err.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    ApiError::Internal(format!("panic: {detail}")).into_response()
}

/// Router completo, listo para `axum::serve`.
pub fn router(state: ApiState) -> Router {
    let keys = Arc::new(state.config.auth_keys.clone());
    let audit = state.config.audit_log;
    let grpc = ServiceBuilder::new().layer(CorsLayer::permissive()).service(grpc::server(state.clone()));

    Router::new().merge(routes::apps::routes())
                 .merge(routes::releases::routes())
                 .merge(routes::formations::routes())
                 .merge(routes::scale::routes())
                 .merge(routes::deployments::routes())
                 .merge(routes::jobs::routes())
                 .merge(routes::app_routes::routes())
                 .merge(routes::providers::routes())
                 .merge(routes::sinks::routes())
                 .merge(routes::events::routes())
                 .merge(routes::system::routes())
                 .route_service(GRPC_PATH, grpc)
                 .fallback(fallback)
                 .layer(from_fn_with_state(audit, audit::audit_body))
                 .layer(from_fn_with_state(keys, auth::require_key))
                 .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                                                      tracing::info_span!("request",
                                                                          method = %req.method(),
                                                                          path = %req.uri().path(),
                                                                          key_id = tracing::field::Empty)
                                                  }))
                 .layer(CatchPanicLayer::custom(panic_response))
                 .with_state(state)
}
