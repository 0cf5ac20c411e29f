use std::sync::Arc;

use flotilla_domain::{DomainError, EventOp, EventType, Job, JobState};
use log::{debug, info};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use super::json;
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

fn job_from_row(row: &PgRow) -> Result<Job> {
    let state: String = row.try_get("state")?;
    Ok(Job { uuid: row.try_get("job_id")?,
             id: row.try_get("cluster_id")?,
             host_id: row.try_get("host_id")?,
             app_id: row.try_get("app_id")?,
             release_id: row.try_get("release_id")?,
             process_type: row.try_get("process_type")?,
             state: state.parse()?,
             args: json(row, "args")?,
             meta: json(row, "meta")?,
             exit_status: row.try_get("exit_status")?,
             host_error: row.try_get("host_error")?,
             run_at: row.try_get("run_at")?,
             restarts: row.try_get("restarts")?,
             created_at: row.try_get("created_at")?,
             updated_at: row.try_get("updated_at")? })
}

/// Cache de jobs alimentada por el scheduler y los hosts.
pub struct JobRepo {
    db: Arc<Db>,
}

impl JobRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Upsert con transiciones sólo hacia adelante
    /// (`pending → starting → up → stopping → {down, crashed, failed}`).
    /// Un retroceso es un error de validación. El evento `job` lleva clave
    /// `(uuid, state)`, así que repetir un reporte no duplica eventos.
    pub async fn put(&self, mut job: Job) -> Result<Job> {
        if job.uuid.is_nil() {
            let (_, uuid) = Job::split_cluster_id(&job.id).ok_or_else(|| DomainError::validation("id", "is not a cluster job id"))?;
            job.uuid = uuid;
        }
        let mut tx = self.db.begin().await?;
        let current = sqlx::query(JOB_SELECT_FOR_UPDATE).bind(job.uuid).fetch_optional(&mut *tx).await?;
        if let Some(row) = current {
            let state: String = row.try_get("state")?;
            let state: JobState = state.parse()?;
            if !state.can_transition_to(job.state) {
                debug!("job:invalid_transition job={} from={state} to={}", job.uuid, job.state);
                return Err(DomainError::validation("state", format!("invalid job state transition: {state} -> {}", job.state)).into());
            }
        }
        let row = sqlx::query(JOB_UPSERT).bind(job.uuid)
                                         .bind(&job.id)
                                         .bind(&job.host_id)
                                         .bind(job.app_id)
                                         .bind(job.release_id)
                                         .bind(&job.process_type)
                                         .bind(job.state.as_str())
                                         .bind(Json(&job.args))
                                         .bind(Json(&job.meta))
                                         .bind(job.exit_status)
                                         .bind(&job.host_error)
                                         .bind(job.run_at)
                                         .bind(job.restarts)
                                         .fetch_one(&mut *tx)
                                         .await?;
        job.created_at = row.try_get("created_at")?;
        job.updated_at = row.try_get("updated_at")?;
        let ev = new_event(Some(job.app_id), job.uuid.to_string(), EventType::Job, EventOp::Update, &job)?.unique(job.event_unique_id());
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("job:put job={} app={} type={} state={}", job.id, job.app_id, job.process_type, job.state);
        Ok(job)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<Job> {
        let pool = self.db.pool();
        let row = sqlx::query(JOB_SELECT).bind(uuid)
                                         .fetch_optional(&pool)
                                         .await?
                                         .ok_or_else(|| DomainError::not_found("job"))?;
        job_from_row(&row)
    }

    pub async fn list(&self, app_id: Uuid) -> Result<Vec<Job>> {
        let pool = self.db.pool();
        let rows = sqlx::query(JOB_LIST_BY_APP).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Jobs no terminados de todas las apps.
    pub async fn list_active(&self) -> Result<Vec<Job>> {
        let pool = self.db.pool();
        let rows = sqlx::query(JOB_LIST_ACTIVE).fetch_all(&pool).await?;
        rows.iter().map(job_from_row).collect()
    }
}
