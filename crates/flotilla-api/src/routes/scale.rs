//! Scale requests.
//!
//! `PUT /apps/:app/scale/:release` crea el request y fija la formación. Un
//! cliente SSE recibe el request, los eventos de jobs del release y los
//! cambios del request hasta que termina (completo o cancelado).

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use flotilla_core::{EventFilter, EventSource};
use flotilla_domain::formation::validate_processes;
use flotilla_domain::{EventType, Job, Processes, ScaleRequest, ScaleRequestState, Tags};
use serde::Deserialize;

use super::{lookup_app, parse_id, release_for_app};
use crate::error::Result;
use crate::sse::{self, wants_sse};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/apps/:app/scale", get(list_scale_requests))
                 .route("/apps/:app/scale/:release", put(create_scale_request))
                 .route("/scale_requests/:id", put(finish_scale_request))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScaleBody {
    processes: Option<Processes>,
    tags: Option<Tags>,
}

async fn create_scale_request(State(state): State<ApiState>,
                              Path((app, release)): Path<(String, String)>,
                              headers: HeaderMap,
                              Json(body): Json<ScaleBody>)
                              -> Result<Response> {
    let app = lookup_app(&state, &app).await?;
    let release = release_for_app(&state, &app, &release).await?;
    if let Some(processes) = &body.processes {
        validate_processes(&release, processes)?;
    }
    if !wants_sse(&headers) {
        let req = state.scales.create(app.id, release.id, body.processes, body.tags).await?;
        return Ok(Json(req).into_response());
    }

    // suscrito antes de crear para no perder ningún evento
    let filter = EventFilter::app(app.id).with_types(&[EventType::ScaleRequest, EventType::ScaleRequestCancelation, EventType::Job]);
    let mut sub = state.listener.subscribe(filter).await?;
    let req = state.scales.create(app.id, release.id, body.processes, body.tags).await?;
    let (id, release_id) = (req.id, release.id);
    Ok(sse::respond(stream! {
        yield Ok(sse::data(&req));
        while let Some(event) = sub.next().await {
            match event.object_type {
                EventType::Job => {
                    if event.decode::<Job>().is_ok_and(|job| job.release_id == release_id) {
                        yield Ok(sse::event_frame(&event));
                    }
                }
                _ => {
                    let Ok(sr) = event.decode::<ScaleRequest>() else { continue };
                    if sr.id != id {
                        continue;
                    }
                    yield Ok(sse::event_frame(&event));
                    if sr.is_finished() {
                        return;
                    }
                }
            }
        }
        if let Some(err) = sub.err() {
            yield Ok(sse::error_frame(err.to_string()));
        }
    }).into_response())
}

async fn list_scale_requests(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.scales.list(app.id).await?))
}

#[derive(Debug, Deserialize)]
struct FinishBody {
    state: ScaleRequestState,
}

async fn finish_scale_request(State(state): State<ApiState>, Path(id): Path<String>, Json(body): Json<FinishBody>) -> Result<impl IntoResponse> {
    let id = parse_id(&id, "scale request")?;
    Ok(Json(state.scales.finish(id, body.state).await?))
}
