//! `/releases` y `/artifacts`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use flotilla_domain::{Artifact, Release};

use super::crud;
use crate::error::Result;
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/releases", post(create_release).get(list_releases))
                 .route("/releases/:release", get(get_release))
                 .route("/artifacts", post(create_artifact).get(list_artifacts))
                 .route("/artifacts/:artifact", get(get_artifact))
}

async fn create_release(State(state): State<ApiState>, Json(release): Json<Release>) -> Result<impl IntoResponse> {
    let release = state.releases.add(release).await?;
    tracing::info!(release_id = %release.id, "release created");
    Ok((StatusCode::CREATED, Json(release)))
}

async fn list_releases(State(state): State<ApiState>) -> Result<impl IntoResponse> { crud::list(&state.releases).await }

async fn get_release(State(state): State<ApiState>, Path(release): Path<String>) -> Result<impl IntoResponse> {
    crud::fetch(&state.releases, &release).await
}

async fn create_artifact(State(state): State<ApiState>, Json(artifact): Json<Artifact>) -> Result<impl IntoResponse> {
    crud::create(&state.artifacts, artifact).await
}

async fn list_artifacts(State(state): State<ApiState>) -> Result<impl IntoResponse> { crud::list(&state.artifacts).await }

async fn get_artifact(State(state): State<ApiState>, Path(artifact): Path<String>) -> Result<impl IntoResponse> {
    crud::fetch(&state.artifacts, &artifact).await
}
