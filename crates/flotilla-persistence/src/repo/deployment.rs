use std::sync::Arc;

use flotilla_core::NewQueueJob;
use flotilla_domain::deployment::DEPLOY_IN_PROGRESS;
use flotilla_domain::{Deployment, DeploymentEvent, DeploymentStatus, DomainError, EventOp, EventType, Formation};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::app::{lock_app, set_release_tx};
use super::formation::{select_formation, upsert_formation};
use super::json;
use super::release::select_release;
use crate::db::Db;
use crate::error::{PersistenceError, Result};
use crate::events::{insert_event, new_event};
use crate::queries::*;
use crate::queue::enqueue;

/// Clase del trabajo de cola que ejecuta un despliegue.
pub const DEPLOYMENT_JOB_CLASS: &str = "deployment";

/// Argumentos del trabajo `deployment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentJobArgs {
    pub id: Uuid,
}

/// Parámetros de `DeploymentRepo::add`. Sin `processes`/`tags` se heredan
/// de la formación del release actual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewDeployment {
    pub app_id: Uuid,
    pub release_id: Uuid,
    pub processes: Option<flotilla_domain::Processes>,
    pub tags: Option<flotilla_domain::Tags>,
}

pub(crate) fn deployment_from_row(row: &PgRow) -> Result<Deployment> {
    let strategy: String = row.try_get("strategy")?;
    let status: String = row.try_get("status")?;
    Ok(Deployment { id: row.try_get("deployment_id")?,
                    app_id: row.try_get("app_id")?,
                    old_release_id: row.try_get("old_release_id")?,
                    new_release_id: row.try_get("new_release_id")?,
                    strategy: strategy.parse()?,
                    processes: json(row, "processes")?,
                    tags: json(row, "tags")?,
                    deploy_timeout: row.try_get("deploy_timeout")?,
                    status: status.parse()?,
                    created_at: row.try_get("created_at")?,
                    finished_at: row.try_get("finished_at")? })
}

async fn select_deployment(conn: &mut PgConnection, id: Uuid) -> Result<Deployment> {
    let row = sqlx::query(DEPLOYMENT_SELECT).bind(id)
                                            .fetch_optional(&mut *conn)
                                            .await?
                                            .ok_or_else(|| DomainError::not_found("deployment"))?;
    deployment_from_row(&row)
}

async fn emit(conn: &mut PgConnection, ev: &DeploymentEvent) -> Result<()> {
    let ev = new_event(Some(ev.app_id), ev.deployment_id.to_string(), EventType::Deployment, EventOp::Update, ev)?;
    insert_event(conn, &ev).await?;
    Ok(())
}

pub struct DeploymentRepo {
    db: Arc<Db>,
}

impl DeploymentRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Crea un despliegue del release pedido.
    ///
    /// Una app sin release actual no necesita orquestación: el despliegue se
    /// registra ya completo, se fija la formación y el release. En otro caso
    /// queda `pending` y se encola el trabajo `deployment` en la misma
    /// transacción. Sólo puede haber un despliegue sin terminar por app.
    pub async fn add(&self, req: NewDeployment) -> Result<Deployment> {
        let mut tx = self.db.begin().await?;
        let app = lock_app(&mut tx, req.app_id).await?;
        let release = select_release(&mut tx, req.release_id).await?;
        if release.app_id.is_some_and(|owner| owner != app.id) {
            return Err(DomainError::not_found("release").into());
        }
        if app.release_id == Some(release.id) {
            return Err(DomainError::validation("release", "is already the current release").into());
        }
        let previous = match app.release_id {
            Some(old) => select_formation(&mut tx, app.id, old).await?,
            None => None,
        };
        let (old_processes, old_tags) = previous.map(|f| (f.processes, f.tags)).unwrap_or_default();
        let mut deployment = Deployment { id: Uuid::new_v4(),
                                          app_id: app.id,
                                          old_release_id: app.release_id,
                                          new_release_id: release.id,
                                          strategy: app.strategy,
                                          processes: req.processes.unwrap_or(old_processes),
                                          tags: req.tags.unwrap_or(old_tags),
                                          deploy_timeout: app.deploy_timeout,
                                          status: DeploymentStatus::Pending,
                                          created_at: None,
                                          finished_at: None };

        let inserted = sqlx::query(DEPLOYMENT_INSERT).bind(deployment.id)
                                                     .bind(deployment.app_id)
                                                     .bind(deployment.old_release_id)
                                                     .bind(deployment.new_release_id)
                                                     .bind(deployment.strategy.as_str())
                                                     .bind(Json(&deployment.processes))
                                                     .bind(Json(&deployment.tags))
                                                     .bind(deployment.deploy_timeout)
                                                     .fetch_one(&mut *tx)
                                                     .await;
        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                let e = PersistenceError::from(e);
                if e.is_unique_violation() {
                    return Err(DomainError::conflict(DEPLOY_IN_PROGRESS).into());
                }
                return Err(e);
            }
        };
        deployment.created_at = row.try_get("created_at")?;

        let mut event = DeploymentEvent::status(release.id, DeploymentStatus::Pending);
        event.app_id = app.id;
        event.deployment_id = deployment.id;

        if deployment.old_release_id.is_none() {
            let mut formation = Formation::new(app.id, release.id, deployment.processes.clone());
            formation.tags = deployment.tags.clone();
            upsert_formation(&mut tx, &mut formation).await?;
            set_release_tx(&mut tx, &app, release.id).await?;
            sqlx::query(DEPLOYMENT_FINISH).bind(deployment.id)
                                          .bind(DeploymentStatus::Complete.as_str())
                                          .execute(&mut *tx)
                                          .await?;
            deployment = select_deployment(&mut tx, deployment.id).await?;
            event.status = DeploymentStatus::Complete;
            emit(&mut tx, &event).await?;
            tx.commit().await?;
            info!("deployment:immediate id={} app={} release={}", deployment.id, app.id, release.id);
            return Ok(deployment);
        }

        let args = serde_json::to_value(DeploymentJobArgs { id: deployment.id })?;
        enqueue(&mut tx, &NewQueueJob::new(DEPLOYMENT_JOB_CLASS, args)).await?;
        emit(&mut tx, &event).await?;
        tx.commit().await?;
        info!("deployment:created id={} app={} strategy={}", deployment.id, app.id, deployment.strategy);
        Ok(deployment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Deployment> {
        let mut conn = self.db.pool().acquire().await?;
        select_deployment(&mut conn, id).await
    }

    pub async fn list(&self, app_id: Uuid) -> Result<Vec<Deployment>> {
        let pool = self.db.pool();
        let rows = sqlx::query(DEPLOYMENT_LIST_BY_APP).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(deployment_from_row).collect()
    }

    /// Publica un `DeploymentEvent`. `running` se refleja además en la fila.
    pub async fn record_event(&self, event: &DeploymentEvent) -> Result<()> {
        let mut tx = self.db.begin().await?;
        if event.status == DeploymentStatus::Running && event.job_type.is_none() {
            sqlx::query(DEPLOYMENT_UPDATE_STATUS).bind(event.deployment_id)
                                                 .bind(DeploymentStatus::Running.as_str())
                                                 .execute(&mut *tx)
                                                 .await?;
        }
        emit(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cierra el despliegue con su estado final. Cerrar uno ya cerrado no
    /// cambia nada.
    pub async fn finish(&self, id: Uuid, status: DeploymentStatus) -> Result<()> {
        if !status.is_final() {
            return Err(DomainError::validation("status", format!("{status} is not a final status")).into());
        }
        let pool = self.db.pool();
        let done = sqlx::query(DEPLOYMENT_FINISH).bind(id).bind(status.as_str()).execute(&pool).await?;
        if done.rows_affected() > 0 {
            info!("deployment:finished id={id} status={status}");
        }
        Ok(())
    }

    /// Pide la cancelación de un despliegue en curso publicando un evento
    /// `cancelled`; el worker que lo ejecuta lo observa y corta sus esperas.
    pub async fn cancel(&self, id: Uuid) -> Result<Deployment> {
        let deployment = self.get(id).await?;
        if deployment.is_finished() {
            return Err(DomainError::conflict(format!("deployment {id} is already {}", deployment.status)).into());
        }
        let mut event = DeploymentEvent::status(deployment.new_release_id, DeploymentStatus::Cancelled);
        event.app_id = deployment.app_id;
        event.deployment_id = deployment.id;
        self.record_event(&event).await?;
        Ok(deployment)
    }
}
