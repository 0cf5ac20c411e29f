use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use flotilla_domain::{DomainError, EventOp, EventType, Release};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::app::select_app;
use super::{ensure_id, json, parse_id, Repository};
use crate::db::Db;
use crate::error::{PersistenceError, Result};
use crate::events::{insert_event, new_event};
use crate::queries::*;

/// Payload de `release_deletion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDeletion {
    pub app_id: Uuid,
    pub release_id: Uuid,
}

pub(crate) fn release_from_row(row: &PgRow) -> Result<Release> {
    Ok(Release { id: row.try_get("release_id")?,
                 app_id: row.try_get("app_id")?,
                 artifacts: row.try_get("artifact_ids")?,
                 env: json(row, "env")?,
                 meta: json(row, "meta")?,
                 processes: json(row, "processes")?,
                 created_at: row.try_get("created_at")? })
}

pub(crate) async fn select_release(conn: &mut PgConnection, id: Uuid) -> Result<Release> {
    let row = sqlx::query(RELEASE_SELECT).bind(id)
                                         .fetch_optional(&mut *conn)
                                         .await?
                                         .ok_or_else(|| DomainError::not_found("release"))?;
    release_from_row(&row)
}

pub struct ReleaseRepo {
    db: Arc<Db>,
}

impl ReleaseRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Inserta un release nuevo. Los releases son inmutables: repetir un id
    /// es un error, y todos los artifacts referenciados deben existir.
    pub async fn add(&self, mut release: Release) -> Result<Release> {
        release.validate()?;
        release.id = ensure_id(release.id);
        let mut tx = self.db.begin().await?;
        let exists: bool = sqlx::query(RELEASE_EXISTS).bind(release.id)
                                                      .fetch_one(&mut *tx)
                                                      .await?
                                                      .try_get(0)?;
        if exists {
            return Err(DomainError::conflict(format!("release {} already exists and cannot be modified", release.id)).into());
        }
        if let Some(app_id) = release.app_id {
            select_app(&mut tx, app_id).await?;
        }
        let wanted: BTreeSet<Uuid> = release.artifacts.iter().copied().collect();
        if wanted.len() != release.artifacts.len() {
            return Err(DomainError::validation("artifacts", "must not contain duplicates").into());
        }
        let found: BTreeSet<Uuid> = sqlx::query(ARTIFACT_LIST_IDS).bind(&release.artifacts)
                                                                  .fetch_all(&mut *tx)
                                                                  .await?
                                                                  .iter()
                                                                  .map(|r| r.try_get("artifact_id"))
                                                                  .collect::<std::result::Result<_, _>>()?;
        if let Some(missing) = wanted.difference(&found).next() {
            return Err(DomainError::validation("artifacts", format!("unknown artifact {missing}")).into());
        }
        let row = sqlx::query(RELEASE_INSERT).bind(release.id)
                                             .bind(release.app_id)
                                             .bind(Json(&release.env))
                                             .bind(Json(&release.processes))
                                             .bind(Json(&release.meta))
                                             .fetch_one(&mut *tx)
                                             .await?;
        release.created_at = row.try_get("created_at")?;
        for (position, artifact_id) in release.artifacts.iter().enumerate() {
            sqlx::query(RELEASE_ARTIFACT_INSERT).bind(release.id)
                                                .bind(artifact_id)
                                                .bind(position as i32)
                                                .execute(&mut *tx)
                                                .await?;
        }
        let ev = new_event(release.app_id, release.id.to_string(), EventType::Release, EventOp::Create, &release)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("release:created id={} artifacts={}", release.id, release.artifacts.len());
        Ok(release)
    }

    pub async fn get(&self, id: Uuid) -> Result<Release> {
        let mut conn = self.db.pool().acquire().await?;
        select_release(&mut conn, id).await
    }

    pub async fn list(&self) -> Result<Vec<Release>> {
        let pool = self.db.pool();
        let rows = sqlx::query(RELEASE_LIST).fetch_all(&pool).await?;
        rows.iter().map(release_from_row).collect()
    }

    pub async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<Release>> {
        let pool = self.db.pool();
        let rows = sqlx::query(RELEASE_APP_LIST).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(release_from_row).collect()
    }

    /// Borrado lógico. Falla si es el release actual de una app viva o si
    /// una formación activa todavía lo usa.
    pub async fn remove(&self, app_id: Uuid, release_id: Uuid) -> Result<ReleaseDeletion> {
        let mut tx = self.db.begin().await?;
        let release = select_release(&mut tx, release_id).await?;
        if release.app_id != Some(app_id) {
            return Err(DomainError::not_found("release").into());
        }
        let formation = sqlx::query(FORMATION_SELECT).bind(app_id)
                                                     .bind(release_id)
                                                     .fetch_optional(&mut *tx)
                                                     .await?;
        if let Some(row) = formation {
            let processes: flotilla_domain::Processes = json(&row, "processes")?;
            if processes.values().any(|n| *n > 0) {
                return Err(DomainError::conflict("cannot delete a release with running processes").into());
            }
        }
        match sqlx::query(RELEASE_DELETE).bind(release_id).execute(&mut *tx).await {
            Ok(_) => {}
            Err(e) => {
                let e = PersistenceError::from(e);
                if e.is_check_violation() {
                    return Err(DomainError::conflict("cannot delete current app release").into());
                }
                return Err(e);
            }
        }
        sqlx::query(FORMATION_DELETE).bind(app_id).bind(release_id).execute(&mut *tx).await?;
        let deletion = ReleaseDeletion { app_id, release_id };
        let ev = new_event(Some(app_id), release_id.to_string(), EventType::ReleaseDeletion, EventOp::Create, &deletion)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("release:deleted id={release_id} app={app_id}");
        Ok(deletion)
    }
}

#[async_trait]
impl Repository for ReleaseRepo {
    type Item = Release;
    type Update = Release;
    type Removed = ReleaseDeletion;

    const KIND: &'static str = "release";

    async fn add(&self, item: Release) -> Result<Release> { ReleaseRepo::add(self, item).await }

    async fn get(&self, id: &str) -> Result<Release> { ReleaseRepo::get(self, parse_id(id, Self::KIND)?).await }

    async fn list(&self) -> Result<Vec<Release>> { ReleaseRepo::list(self).await }

    async fn remove(&self, id: &str) -> Result<ReleaseDeletion> {
        let release = ReleaseRepo::get(self, parse_id(id, Self::KIND)?).await?;
        let app_id = release.app_id.ok_or_else(|| DomainError::not_found(Self::KIND))?;
        ReleaseRepo::remove(self, app_id, release.id).await
    }
}
