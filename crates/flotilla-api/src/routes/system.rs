//! Endpoints de sistema: salud, CA, backups y migración de dominio.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, Result};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/ping", get(ping))
                 .route("/ca-cert", get(ca_cert))
                 .route("/status", get(status))
                 .route("/backup", get(download_backup).post(schedule_backup))
                 .route("/backup/latest", get(latest_backup))
                 .route("/domain", put(migrate_domain).get(latest_domain_migration))
}

async fn ping() -> StatusCode { StatusCode::OK }

async fn ca_cert(State(state): State<ApiState>) -> Result<Response> {
    let cert = state.config.ca_cert.clone().ok_or_else(|| ApiError::not_found("ca-cert"))?;
    Ok(([(header::CONTENT_TYPE, "application/x-x509-ca-cert")], cert).into_response())
}

async fn status(State(state): State<ApiState>) -> Response {
    match state.db.ping().await {
        Ok(()) => Json(json!({ "status": "healthy" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "status check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unhealthy", "detail": { "db": e.to_string() } }))).into_response()
        }
    }
}

/// Tar con el dump del estado, servido en el momento.
async fn download_backup(State(state): State<ApiState>) -> Result<Response> {
    let archive = state.backup_writer.archive().await?;
    tracing::info!(name = %archive.name, size = archive.size, sha512 = %archive.sha512, "backup streamed");
    let disposition = format!("attachment; filename=\"{}\"", archive.name);
    Ok(([(header::CONTENT_TYPE, "application/tar".to_string()), (header::CONTENT_DISPOSITION, disposition)], archive.bytes).into_response())
}

/// Encola un backup al blobstore.
async fn schedule_backup(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    Ok((StatusCode::ACCEPTED, Json(state.backups.schedule().await?)))
}

async fn latest_backup(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let backup = state.backups.latest().await?.ok_or_else(|| ApiError::not_found("backup"))?;
    Ok(Json(backup))
}

#[derive(Debug, Deserialize)]
struct DomainBody {
    domain: String,
}

async fn migrate_domain(State(state): State<ApiState>, Json(body): Json<DomainBody>) -> Result<impl IntoResponse> {
    let migration = state.domain_migrations.add(body.domain.trim()).await?;
    tracing::info!(migration_id = %migration.id, old_domain = %migration.old_domain, domain = %migration.domain, "domain migration queued");
    Ok(Json(migration))
}

async fn latest_domain_migration(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let migration = state.domain_migrations.latest().await?.ok_or_else(|| ApiError::not_found("domain migration"))?;
    Ok(Json(migration))
}
