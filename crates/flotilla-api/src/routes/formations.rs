//! Formaciones por app y el listado global expandido que consume el
//! scheduler.

use async_stream::stream;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use flotilla_domain::formation::validate_processes;
use flotilla_domain::{Formation, Processes, Tags};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use super::{lookup_app, release_for_app};
use crate::error::Result;
use crate::sse::{self, wants_sse, PAGE_COMPLETE};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/apps/:app/formations", get(list_formations))
                 .route("/apps/:app/formations/:release",
                        get(get_formation).put(put_formation).delete(delete_formation))
                 .route("/formations", get(list_active_formations))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FormationBody {
    processes: Processes,
    tags: Tags,
}

async fn put_formation(State(state): State<ApiState>,
                       Path((app, release)): Path<(String, String)>,
                       Json(body): Json<FormationBody>)
                       -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let release = release_for_app(&state, &app, &release).await?;
    validate_processes(&release, &body.processes)?;
    let mut formation = Formation::new(app.id, release.id, body.processes);
    formation.tags = body.tags;
    Ok(Json(state.formations.put(formation).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExpandQuery {
    expand: bool,
}

async fn get_formation(State(state): State<ApiState>,
                       Path((app, release)): Path<(String, String)>,
                       Query(q): Query<ExpandQuery>)
                       -> Result<Response> {
    let app = lookup_app(&state, &app).await?;
    let release = release_for_app(&state, &app, &release).await?;
    if q.expand {
        return Ok(Json(state.formations.get_expanded(app.id, release.id).await?).into_response());
    }
    Ok(Json(state.formations.get(app.id, release.id).await?).into_response())
}

async fn delete_formation(State(state): State<ApiState>, Path((app, release)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let release = release_for_app(&state, &app, &release).await?;
    Ok(Json(state.formations.remove(app.id, release.id).await?))
}

async fn list_formations(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.formations.list(app.id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamQuery {
    stream: bool,
}

/// Formaciones activas. Con `stream=true` (o SSE) sigue con cada cambio
/// notificado por el canal `formations`.
async fn list_active_formations(State(state): State<ApiState>,
                                headers: HeaderMap,
                                Query(q): Query<StreamQuery>)
                                -> Result<Response> {
    if !q.stream && !wants_sse(&headers) {
        return Ok(Json(state.formations.list_active().await?).into_response());
    }
    let mut changes = state.listener.subscribe_formations().await?;
    let initial = state.formations.list_active().await?;
    Ok(sse::respond(stream! {
        for ef in &initial {
            yield Ok(sse::data(ef));
        }
        yield Ok(axum::response::sse::Event::default().event(PAGE_COMPLETE).data("{}"));
        loop {
            match changes.recv().await {
                Ok(key) => match state.formations.get_expanded(key.app_id, key.release_id).await {
                    Ok(ef) => yield Ok(sse::data(&ef)),
                    Err(e) => tracing::warn!(app_id = %key.app_id, release_id = %key.release_id, error = %e, "formation expand failed"),
                },
                Err(RecvError::Lagged(n)) => {
                    yield Ok(sse::error_frame(format!("formation stream lagged by {n}")));
                    return;
                }
                Err(RecvError::Closed) => {
                    yield Ok(sse::error_frame("event listener closed"));
                    return;
                }
            }
        }
    }).into_response())
}
