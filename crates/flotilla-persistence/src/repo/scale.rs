use std::sync::Arc;

use flotilla_domain::{DomainError, EventOp, EventType, Formation, Processes, ScaleRequest, ScaleRequestState, Tags};
use log::info;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::formation::{select_formation, upsert_formation};
use super::{json, json_opt};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

pub(crate) fn scale_request_from_row(row: &PgRow) -> Result<ScaleRequest> {
    let state: String = row.try_get("state")?;
    Ok(ScaleRequest { id: row.try_get("scale_request_id")?,
                      app_id: row.try_get("app_id")?,
                      release_id: row.try_get("release_id")?,
                      state: state.parse()?,
                      old_processes: json(row, "old_processes")?,
                      new_processes: json_opt(row, "new_processes")?,
                      old_tags: json(row, "old_tags")?,
                      new_tags: json_opt(row, "new_tags")?,
                      created_at: row.try_get("created_at")?,
                      updated_at: row.try_get("updated_at")? })
}

/// Inserta el request y emite `scale_request` con clave `(id, state)`.
pub(crate) async fn insert_scale_request(conn: &mut PgConnection, mut req: ScaleRequest) -> Result<ScaleRequest> {
    let row = sqlx::query(SCALE_REQUEST_INSERT).bind(req.id)
                                               .bind(req.app_id)
                                               .bind(req.release_id)
                                               .bind(req.state.as_str())
                                               .bind(Json(&req.old_processes))
                                               .bind(req.new_processes.as_ref().map(Json))
                                               .bind(Json(&req.old_tags))
                                               .bind(req.new_tags.as_ref().map(Json))
                                               .fetch_one(&mut *conn)
                                               .await?;
    req.created_at = row.try_get("created_at")?;
    req.updated_at = row.try_get("updated_at")?;
    emit(conn, &req, EventType::ScaleRequest).await?;
    Ok(req)
}

async fn emit(conn: &mut PgConnection, req: &ScaleRequest, typ: EventType) -> Result<()> {
    let ev = new_event(Some(req.app_id), req.id.to_string(), typ, EventOp::Update, req)?.unique(req.event_unique_id());
    insert_event(conn, &ev).await?;
    Ok(())
}

pub struct ScaleRequestRepo {
    db: Arc<Db>,
}

impl ScaleRequestRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Crea un scale request pendiente y aplica los nuevos contadores/tags a
    /// la formación. Un request pendiente previo para el mismo par queda
    /// cancelado (`scale_request_cancelation`).
    pub async fn create(&self,
                        app_id: Uuid,
                        release_id: Uuid,
                        new_processes: Option<Processes>,
                        new_tags: Option<Tags>)
                        -> Result<ScaleRequest> {
        let mut tx = self.db.begin().await?;
        let cancelled = sqlx::query(SCALE_REQUEST_CANCEL).bind(app_id)
                                                         .bind(release_id)
                                                         .fetch_optional(&mut *tx)
                                                         .await?;
        if let Some(row) = cancelled {
            let prev = scale_request_from_row(&row)?;
            emit(&mut tx, &prev, EventType::ScaleRequestCancelation).await?;
            info!("scale:cancelled id={} app={app_id}", prev.id);
        }
        let current = select_formation(&mut tx, app_id, release_id).await?;
        let mut formation = current.clone().unwrap_or_else(|| Formation::new(app_id, release_id, Processes::new()));
        let (old_processes, old_tags) = current.map(|f| (f.processes, f.tags)).unwrap_or_default();
        if let Some(p) = &new_processes {
            formation.processes = p.clone();
        }
        if let Some(t) = &new_tags {
            formation.tags = t.clone();
        }
        let req = ScaleRequest { id: Uuid::new_v4(),
                                 app_id,
                                 release_id,
                                 state: ScaleRequestState::Pending,
                                 old_processes,
                                 new_processes,
                                 old_tags,
                                 new_tags,
                                 created_at: None,
                                 updated_at: None };
        let req = insert_scale_request(&mut tx, req).await?;
        upsert_formation(&mut tx, &mut formation).await?;
        tx.commit().await?;
        info!("scale:created id={} app={app_id} release={release_id}", req.id);
        Ok(req)
    }

    /// Transición final (`complete` o `cancelled`) reportada por el
    /// scheduler. Sólo se admite desde `pending`.
    pub async fn finish(&self, id: Uuid, state: ScaleRequestState) -> Result<ScaleRequest> {
        if state == ScaleRequestState::Pending {
            return Err(DomainError::validation("state", "must be complete or cancelled").into());
        }
        let mut tx = self.db.begin().await?;
        let current = sqlx::query(SCALE_REQUEST_SELECT).bind(id)
                                                       .fetch_optional(&mut *tx)
                                                       .await?
                                                       .ok_or_else(|| DomainError::not_found("scale request"))?;
        let current = scale_request_from_row(&current)?;
        if current.is_finished() {
            if current.state == state {
                return Ok(current);
            }
            return Err(DomainError::validation("state", format!("scale request is already {}", current.state)).into());
        }
        let row = sqlx::query(SCALE_REQUEST_UPDATE).bind(id)
                                                   .bind(state.as_str())
                                                   .fetch_one(&mut *tx)
                                                   .await?;
        let req = scale_request_from_row(&row)?;
        let typ = match state {
            ScaleRequestState::Cancelled => EventType::ScaleRequestCancelation,
            _ => EventType::ScaleRequest,
        };
        emit(&mut tx, &req, typ).await?;
        tx.commit().await?;
        Ok(req)
    }

    pub async fn get(&self, id: Uuid) -> Result<ScaleRequest> {
        let pool = self.db.pool();
        let row = sqlx::query(SCALE_REQUEST_SELECT).bind(id)
                                                   .fetch_optional(&pool)
                                                   .await?
                                                   .ok_or_else(|| DomainError::not_found("scale request"))?;
        scale_request_from_row(&row)
    }

    pub async fn list(&self, app_id: Uuid) -> Result<Vec<ScaleRequest>> {
        let pool = self.db.pool();
        let rows = sqlx::query(SCALE_REQUEST_LIST_BY_APP).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(scale_request_from_row).collect()
    }
}
