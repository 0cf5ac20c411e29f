//! Despliegues: creación (con seguimiento SSE opcional), listado y
//! cancelación.

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flotilla_core::{EventFilter, EventSource, EventSubscriber};
use flotilla_domain::{App, Deployment, DeploymentEvent, EventType, Processes, Tags};
use flotilla_persistence::NewDeployment;
use serde::Deserialize;
use uuid::Uuid;

use super::{lookup_app, parse_id};
use crate::error::Result;
use crate::sse::{self, wants_sse};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/apps/:app/deploy", post(create_deployment))
                 .route("/apps/:app/deployments", get(list_deployments))
                 .route("/deployments/:id", get(get_deployment).delete(cancel_deployment))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeployBody {
    /// Release a desplegar.
    pub id: Uuid,
    #[serde(default)]
    pub processes: Option<Processes>,
    #[serde(default)]
    pub tags: Option<Tags>,
}

/// Crea el despliegue con una suscripción ya abierta a sus eventos.
pub(crate) async fn deploy_and_subscribe(state: &ApiState, app: &App, body: DeployBody) -> Result<(Deployment, EventSubscriber)> {
    let filter = EventFilter::app(app.id).with_types(&[EventType::Deployment]);
    let sub = state.listener.subscribe(filter).await?;
    let deployment = state.deployments
                          .add(NewDeployment { app_id: app.id,
                                               release_id: body.id,
                                               processes: body.processes,
                                               tags: body.tags })
                          .await?;
    tracing::info!(deployment_id = %deployment.id, app_id = %app.id, status = %deployment.status, "deployment created");
    Ok((deployment, sub))
}

/// Siguiente evento del despliegue `id`; `None` cuando la suscripción se
/// cierra.
pub(crate) async fn next_deployment_event(sub: &mut EventSubscriber, id: Uuid) -> Option<DeploymentEvent> {
    while let Some(event) = sub.next().await {
        if event.object_id != id.to_string() {
            continue;
        }
        if let Ok(ev) = event.decode::<DeploymentEvent>() {
            return Some(ev);
        }
    }
    None
}

async fn create_deployment(State(state): State<ApiState>,
                           Path(app): Path<String>,
                           headers: HeaderMap,
                           Json(body): Json<DeployBody>)
                           -> Result<Response> {
    let app = lookup_app(&state, &app).await?;
    let (deployment, mut sub) = deploy_and_subscribe(&state, &app, body).await?;
    if !wants_sse(&headers) {
        return Ok((StatusCode::OK, Json(deployment)).into_response());
    }
    let id = deployment.id;
    Ok(sse::respond(stream! {
        yield Ok(sse::data(&deployment));
        while let Some(ev) = next_deployment_event(&mut sub, id).await {
            yield Ok(sse::data(&ev));
            if ev.status.is_final() {
                return;
            }
        }
        if let Some(err) = sub.err() {
            yield Ok(sse::error_frame(err.to_string()));
        }
    }).into_response())
}

async fn list_deployments(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.deployments.list(app.id).await?))
}

async fn get_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    Ok(Json(state.deployments.get(parse_id(&id, "deployment")?).await?))
}

async fn cancel_deployment(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let deployment = state.deployments.cancel(parse_id(&id, "deployment")?).await?;
    tracing::info!(deployment_id = %deployment.id, "deployment cancellation requested");
    Ok(Json(deployment))
}
