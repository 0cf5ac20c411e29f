//! Sinks de logs, volúmenes y claves SSH.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use flotilla_domain::{Key, Sink, Volume};

use super::{crud, lookup_app, parse_id};
use crate::error::Result;
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/sinks", get(list_sinks).post(create_sink))
                 .route("/sinks/:id", get(get_sink).delete(delete_sink))
                 .route("/volumes", get(list_volumes))
                 .route("/volumes/:id", get(get_volume).put(put_volume))
                 .route("/apps/:app/volumes", get(list_app_volumes))
                 .route("/apps/:app/volumes/:id/decommission", put(decommission_volume))
                 .route("/keys", get(list_keys).post(create_key))
                 .route("/keys/:id", get(get_key).delete(delete_key))
}

async fn create_sink(State(state): State<ApiState>, Json(sink): Json<Sink>) -> Result<impl IntoResponse> { crud::create(&state.sinks, sink).await }

async fn list_sinks(State(state): State<ApiState>) -> Result<impl IntoResponse> { crud::list(&state.sinks).await }

async fn get_sink(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> { crud::fetch(&state.sinks, &id).await }

async fn delete_sink(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> { crud::remove(&state.sinks, &id).await }

async fn list_volumes(State(state): State<ApiState>) -> Result<impl IntoResponse> { Ok(Json(state.volumes.list().await?)) }

async fn get_volume(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    Ok(Json(state.volumes.get(parse_id(&id, "volume")?).await?))
}

/// Reporte de un host agent.
async fn put_volume(State(state): State<ApiState>, Path(id): Path<String>, Json(mut volume): Json<Volume>) -> Result<impl IntoResponse> {
    volume.id = parse_id(&id, "volume")?;
    Ok(Json(state.volumes.put(volume).await?))
}

async fn list_app_volumes(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.volumes.list_by_app(app.id).await?))
}

async fn decommission_volume(State(state): State<ApiState>, Path((app, id)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.volumes.decommission(app.id, parse_id(&id, "volume")?).await?))
}

async fn create_key(State(state): State<ApiState>, Json(key): Json<Key>) -> Result<impl IntoResponse> { crud::create(&state.keys, key).await }

async fn list_keys(State(state): State<ApiState>) -> Result<impl IntoResponse> { crud::list(&state.keys).await }

async fn get_key(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> { crud::fetch(&state.keys, &id).await }

async fn delete_key(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> { crud::remove(&state.keys, &id).await }
