//! Jobs: reportes del scheduler / host agent, ejecución puntual y kill.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use flotilla_adapters::HostJob;
use flotilla_core::{EventFilter, EventSource};
use flotilla_domain::{EventType, Job, JobState, Labels, ProcessType};
use serde::Deserialize;
use uuid::Uuid;

use super::{lookup_app, release_for_app};
use crate::error::{ApiError, Result};
use crate::sse::{self, wants_sse};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/apps/:app/jobs", get(list_jobs).post(run_job))
                 .route("/apps/:app/jobs/:job", get(get_job).put(put_job).delete(kill_job))
                 .route("/active-jobs", get(list_active_jobs))
}

/// Acepta tanto el uuid como el id de cluster `<host>-<uuid>`.
fn job_uuid(id: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }
    Job::split_cluster_id(id).map(|(_, uuid)| uuid).ok_or_else(|| ApiError::not_found("job"))
}

async fn list_jobs(State(state): State<ApiState>, Path(app): Path<String>, headers: HeaderMap) -> Result<Response> {
    let app = lookup_app(&state, &app).await?;
    if !wants_sse(&headers) {
        return Ok(Json(state.jobs.list(app.id).await?).into_response());
    }
    let sub = state.listener.subscribe(EventFilter::app(app.id).with_types(&[EventType::Job])).await?;
    let initial = state.jobs.list(app.id).await?;
    Ok(sse::list_then_live(initial, sub, |event| Ok(event.decode::<Job>().ok())).into_response())
}

async fn get_job(State(state): State<ApiState>, Path((app, job)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let job = state.jobs.get(job_uuid(&job)?).await?;
    if job.app_id != app.id {
        return Err(ApiError::not_found("job"));
    }
    Ok(Json(job))
}

/// Reporte de estado. El repo rechaza las transiciones hacia atrás.
async fn put_job(State(state): State<ApiState>,
                 Path((app, id)): Path<(String, String)>,
                 Json(mut job): Json<Job>)
                 -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let uuid = job_uuid(&id)?;
    if !job.uuid.is_nil() && job.uuid != uuid {
        return Err(ApiError::validation("uuid", "does not match the job in the path"));
    }
    job.uuid = uuid;
    job.app_id = app.id;
    if job.id.is_empty() {
        job.id = id;
    }
    if job.host_id.is_empty() {
        if let Some((host, _)) = Job::split_cluster_id(&job.id) {
            job.host_id = host.to_string();
        }
    }
    Ok(Json(state.jobs.put(job).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunBody {
    /// Release a usar; por defecto el actual de la app.
    release: Option<String>,
    /// Tipo de proceso del release. Sin tipo se usan `args` tal cual.
    #[serde(rename = "type")]
    process_type: Option<String>,
    args: Vec<String>,
    env: Labels,
    meta: Labels,
}

/// Lanza un job puntual en el primer host disponible.
async fn run_job(State(state): State<ApiState>, Path(app): Path<String>, Json(body): Json<RunBody>) -> Result<Response> {
    let app = lookup_app(&state, &app).await?;
    let release = match &body.release {
        Some(id) => release_for_app(&state, &app, id).await?,
        None => state.apps.get_release(app.id).await?,
    };
    let (process_type, mut proc) = match &body.process_type {
        Some(t) => {
            let proc = release.processes
                              .get(t)
                              .cloned()
                              .ok_or_else(|| ApiError::validation("type", format!("unknown process type {t:?}")))?;
            (t.clone(), proc)
        }
        None if body.args.is_empty() => return Err(ApiError::validation("args", "must be set when no type is given")),
        None => ("run".to_string(), ProcessType::default()),
    };
    if !body.args.is_empty() {
        proc.args = body.args.clone();
    }
    proc.env.extend(body.env);

    let hosts = state.cluster.hosts().await?;
    let host = hosts.first().ok_or_else(|| ApiError::Unavailable("no hosts available".into()))?;
    let mut spec = HostJob::for_process(host.id(), app.id, &release, &process_type, &proc);
    spec.metadata.extend(body.meta);

    let (_, uuid) = Job::split_cluster_id(&spec.id).ok_or_else(|| ApiError::Internal(format!("bad cluster job id {}", spec.id)))?;
    let job = Job { uuid,
                    id: spec.id.clone(),
                    host_id: host.id().to_string(),
                    app_id: app.id,
                    release_id: release.id,
                    process_type,
                    state: JobState::Pending,
                    args: spec.config.args.clone(),
                    meta: spec.metadata.clone(),
                    ..Job::default() };
    let job = state.jobs.put(job).await?;
    if let Err(e) = host.add_job(&spec).await {
        tracing::warn!(job_id = %job.id, host_id = host.id(), error = %e, "host rejected job");
        let failed = Job { state: JobState::Failed,
                           host_error: Some(e.to_string()),
                           ..job };
        state.jobs.put(failed).await?;
        return Err(e.into());
    }
    tracing::info!(job_id = %job.id, app_id = %app.id, host_id = host.id(), "job started");
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

async fn kill_job(State(state): State<ApiState>, Path((app, job)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let job = state.jobs.get(job_uuid(&job)?).await?;
    if job.app_id != app.id {
        return Err(ApiError::not_found("job"));
    }
    let host = state.cluster.host(&job.host_id).await?;
    host.stop_job(&job.id).await?;
    tracing::info!(job_id = %job.id, host_id = %job.host_id, "job stop requested");
    Ok(Json(job))
}

async fn list_active_jobs(State(state): State<ApiState>) -> Result<impl IntoResponse> { Ok(Json(state.jobs.list_active().await?)) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_accept_uuid_or_cluster_form() {
        let uuid = Uuid::new_v4();
        assert_eq!(job_uuid(&uuid.to_string()).unwrap(), uuid);
        assert_eq!(job_uuid(&Job::cluster_id("host-1", uuid)).unwrap(), uuid);
        assert!(matches!(job_uuid("nope"), Err(ApiError::NotFound(_))));
    }
}
