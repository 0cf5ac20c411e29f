//! `/apps`: CRUD de apps, release actual y listados por app.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use flotilla_core::{EventFilter, EventSource};
use flotilla_domain::{App, EventType, Labels};
use flotilla_persistence::AppUpdate;
use serde::Deserialize;
use uuid::Uuid;

use super::{crud, lookup_app, parse_id};
use crate::error::Result;
use crate::sse::{self, wants_sse};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/apps", post(create_app).get(list_apps))
                 .route("/apps/:app", get(get_app).post(update_app).delete(delete_app))
                 .route("/apps/:app/meta", post(update_meta))
                 .route("/apps/:app/release", get(get_app_release).put(set_app_release))
                 .route("/apps/:app/releases", get(list_app_releases))
                 .route("/apps/:app/releases/:release", delete(delete_app_release))
                 .route("/apps/:app/resources", get(list_app_resources))
}

async fn create_app(State(state): State<ApiState>, Json(app): Json<App>) -> Result<(StatusCode, Json<App>)> {
    let app = state.apps.add(app).await?;
    tracing::info!(app_id = %app.id, name = %app.name, "app created");
    Ok((StatusCode::CREATED, Json(app)))
}

/// Lista completa; con `Accept: text/event-stream` sigue con cada cambio.
/// Los filtros por nombre y labels son cosa de `StreamApps` (gRPC): por
/// HTTP el cliente filtra lo que recibe.
async fn list_apps(State(state): State<ApiState>, headers: HeaderMap) -> Result<Response> {
    if !wants_sse(&headers) {
        return Ok(Json(state.apps.list().await?).into_response());
    }
    let filter = EventFilter::default().with_types(&[EventType::App]);
    let sub = state.listener.subscribe(filter).await?;
    let initial = state.apps.list().await?;
    Ok(sse::list_then_live(initial, sub, |event| Ok(event.decode::<App>().ok())).into_response())
}

async fn get_app(State(state): State<ApiState>, Path(app): Path<String>) -> Result<Json<App>> {
    Ok(Json(lookup_app(&state, &app).await?))
}

async fn update_app(State(state): State<ApiState>, Path(app): Path<String>, Json(update): Json<AppUpdate>) -> Result<Json<App>> {
    crud::update(&state.apps, &app, update).await
}

#[derive(Debug, Deserialize)]
struct MetaBody {
    meta: Labels,
}

async fn update_meta(State(state): State<ApiState>, Path(app): Path<String>, Json(body): Json<MetaBody>) -> Result<Json<App>> {
    let app = lookup_app(&state, &app).await?;
    let update = AppUpdate { meta: Some(body.meta),
                             ..AppUpdate::default() };
    Ok(Json(state.apps.update(app.id, update).await?))
}

async fn delete_app(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let Json(deletion) = crud::remove(&state.apps, &app).await?;
    tracing::info!(app_id = %deletion.app.id, releases = deletion.deleted_releases.len(), "app deleted");
    Ok(Json(deletion))
}

#[derive(Debug, Deserialize)]
struct ReleaseRef {
    id: Uuid,
}

async fn set_app_release(State(state): State<ApiState>,
                         Path(app): Path<String>,
                         Json(body): Json<ReleaseRef>)
                         -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    state.apps.set_release(app.id, body.id).await?;
    Ok(Json(state.releases.get(body.id).await?))
}

async fn get_app_release(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.apps.get_release(app.id).await?))
}

async fn list_app_releases(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.releases.list_by_app(app.id).await?))
}

async fn delete_app_release(State(state): State<ApiState>, Path((app, release)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let release = parse_id(&release, "release")?;
    Ok(Json(state.releases.remove(app.id, release).await?))
}

async fn list_app_resources(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.resources.list_by_app(app.id).await?))
}
