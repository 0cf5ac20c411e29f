use std::sync::Arc;

use flotilla_domain::formation::validate_processes;
use flotilla_domain::{DomainError, EventOp, EventType, ExpandedFormation, Formation, ScaleRequest, ScaleRequestState};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::app::select_app;
use super::artifact::select_artifacts;
use super::json;
use super::release::select_release;
use super::scale::{insert_scale_request, scale_request_from_row};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

/// Payload de `formation_deletion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationDeletion {
    pub app_id: Uuid,
    pub release_id: Uuid,
}

pub(crate) fn formation_from_row(row: &PgRow) -> Result<Formation> {
    Ok(Formation { app_id: row.try_get("app_id")?,
                   release_id: row.try_get("release_id")?,
                   processes: json(row, "processes")?,
                   tags: json(row, "tags")?,
                   created_at: row.try_get("created_at")?,
                   updated_at: row.try_get("updated_at")? })
}

pub(crate) async fn select_formation(conn: &mut PgConnection, app_id: Uuid, release_id: Uuid) -> Result<Option<Formation>> {
    let row = sqlx::query(FORMATION_SELECT).bind(app_id)
                                           .bind(release_id)
                                           .fetch_optional(&mut *conn)
                                           .await?;
    row.as_ref().map(formation_from_row).transpose()
}

/// Valida contra el release, hace upsert y emite `formation`. Completa
/// `created_at`/`updated_at` en `formation`.
pub(crate) async fn upsert_formation(conn: &mut PgConnection, formation: &mut Formation) -> Result<()> {
    select_app(conn, formation.app_id).await?;
    let release = select_release(conn, formation.release_id).await?;
    if release.app_id.is_some_and(|owner| owner != formation.app_id) {
        return Err(DomainError::not_found("release").into());
    }
    validate_processes(&release, &formation.processes)?;
    let row = sqlx::query(FORMATION_UPSERT).bind(formation.app_id)
                                           .bind(formation.release_id)
                                           .bind(Json(&formation.processes))
                                           .bind(Json(&formation.tags))
                                           .fetch_one(&mut *conn)
                                           .await?;
    formation.created_at = row.try_get("created_at")?;
    formation.updated_at = row.try_get("updated_at")?;
    let ev = new_event(Some(formation.app_id),
                       format!("{}:{}", formation.app_id, formation.release_id),
                       EventType::Formation,
                       EventOp::Update,
                       &*formation)?;
    insert_event(conn, &ev).await?;
    Ok(())
}

pub struct FormationRepo {
    db: Arc<Db>,
}

impl FormationRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Fija la formación directamente. Deja constancia como un scale request
    /// ya completado.
    pub async fn put(&self, mut formation: Formation) -> Result<Formation> {
        let mut tx = self.db.begin().await?;
        let previous = select_formation(&mut tx, formation.app_id, formation.release_id).await?;
        upsert_formation(&mut tx, &mut formation).await?;
        let (old_processes, old_tags) = previous.map(|f| (f.processes, f.tags)).unwrap_or_default();
        let request = ScaleRequest { id: Uuid::new_v4(),
                                     app_id: formation.app_id,
                                     release_id: formation.release_id,
                                     state: ScaleRequestState::Complete,
                                     old_processes,
                                     new_processes: Some(formation.processes.clone()),
                                     old_tags,
                                     new_tags: Some(formation.tags.clone()),
                                     created_at: None,
                                     updated_at: None };
        insert_scale_request(&mut tx, request).await?;
        tx.commit().await?;
        info!("formation:put app={} release={} processes={:?}",
              formation.app_id, formation.release_id, formation.processes);
        Ok(formation)
    }

    pub async fn get(&self, app_id: Uuid, release_id: Uuid) -> Result<Formation> {
        let mut conn = self.db.pool().acquire().await?;
        select_formation(&mut conn, app_id, release_id).await?
                                                         .ok_or_else(|| DomainError::not_found("formation").into())
    }

    pub async fn list(&self, app_id: Uuid) -> Result<Vec<Formation>> {
        let pool = self.db.pool();
        let rows = sqlx::query(FORMATION_LIST_BY_APP).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(formation_from_row).collect()
    }

    pub async fn remove(&self, app_id: Uuid, release_id: Uuid) -> Result<FormationDeletion> {
        let mut tx = self.db.begin().await?;
        let done = sqlx::query(FORMATION_DELETE).bind(app_id)
                                                .bind(release_id)
                                                .execute(&mut *tx)
                                                .await?;
        if done.rows_affected() == 0 {
            return Err(DomainError::not_found("formation").into());
        }
        let deletion = FormationDeletion { app_id, release_id };
        let ev = new_event(Some(app_id),
                           format!("{app_id}:{release_id}"),
                           EventType::FormationDeletion,
                           EventOp::Create,
                           &deletion)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        Ok(deletion)
    }

    /// Formación expandida (app + release + artifacts + scale request
    /// pendiente). Una formación borrada se devuelve con `deleted = true` y
    /// contadores vacíos.
    pub async fn get_expanded(&self, app_id: Uuid, release_id: Uuid) -> Result<ExpandedFormation> {
        let mut conn = self.db.pool().acquire().await?;
        let row = sqlx::query(FORMATION_SELECT_ANY).bind(app_id)
                                                   .bind(release_id)
                                                   .fetch_optional(&mut *conn)
                                                   .await?
                                                   .ok_or_else(|| DomainError::not_found("formation"))?;
        let formation = formation_from_row(&row)?;
        let deleted_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("deleted_at")?;
        expand(&mut conn, formation, deleted_at.is_some()).await
    }

    /// Formaciones con al menos un proceso, expandidas.
    pub async fn list_active(&self) -> Result<Vec<ExpandedFormation>> {
        let mut conn = self.db.pool().acquire().await?;
        let rows = sqlx::query(FORMATION_LIST_ACTIVE).fetch_all(&mut *conn).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let formation = formation_from_row(row)?;
            out.push(expand(&mut conn, formation, false).await?);
        }
        Ok(out)
    }
}

async fn expand(conn: &mut PgConnection, formation: Formation, deleted: bool) -> Result<ExpandedFormation> {
    let app = select_app(conn, formation.app_id).await?;
    let release = select_release(conn, formation.release_id).await?;
    let artifacts = select_artifacts(conn, &release.artifacts).await?;
    let pending = sqlx::query(SCALE_REQUEST_SELECT_PENDING).bind(formation.app_id)
                                                           .bind(formation.release_id)
                                                           .fetch_optional(&mut *conn)
                                                           .await?;
    let pending_scale_request = pending.as_ref().map(scale_request_from_row).transpose()?;
    Ok(ExpandedFormation { app,
                           release,
                           artifacts,
                           processes: if deleted { Default::default() } else { formation.processes },
                           tags: formation.tags,
                           pending_scale_request,
                           updated_at: formation.updated_at,
                           deleted })
}
