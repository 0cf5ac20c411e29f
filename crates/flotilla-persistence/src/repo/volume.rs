use std::sync::Arc;

use flotilla_domain::{DomainError, EventOp, EventType, Volume};
use log::info;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use super::{ensure_id, json};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

fn volume_from_row(row: &PgRow) -> Result<Volume> {
    let decommissioned_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("decommissioned_at")?;
    Ok(Volume { id: row.try_get("volume_id")?,
                host_id: row.try_get("host_id")?,
                app_id: row.try_get("app_id")?,
                release_id: row.try_get("release_id")?,
                job_id: row.try_get("job_id")?,
                job_type: row.try_get("job_type")?,
                state: row.try_get("state")?,
                volume_type: row.try_get("type")?,
                path: row.try_get("path")?,
                delete_on_stop: row.try_get("delete_on_stop")?,
                meta: json(row, "meta")?,
                decommissioned: decommissioned_at.is_some(),
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                decommissioned_at })
}

/// Volúmenes reportados por los hosts.
pub struct VolumeRepo {
    db: Arc<Db>,
}

impl VolumeRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Upsert por id; en una fila existente sólo cambian job, estado y meta.
    pub async fn put(&self, mut volume: Volume) -> Result<Volume> {
        if volume.host_id.is_empty() {
            return Err(DomainError::validation("host_id", "must not be empty").into());
        }
        volume.id = ensure_id(volume.id);
        if volume.state.is_empty() {
            volume.state = "pending".into();
        }
        if volume.volume_type.is_empty() {
            volume.volume_type = "data".into();
        }
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(VOLUME_UPSERT).bind(volume.id)
                                            .bind(&volume.host_id)
                                            .bind(volume.app_id)
                                            .bind(volume.release_id)
                                            .bind(&volume.job_id)
                                            .bind(&volume.job_type)
                                            .bind(&volume.state)
                                            .bind(&volume.volume_type)
                                            .bind(&volume.path)
                                            .bind(volume.delete_on_stop)
                                            .bind(Json(&volume.meta))
                                            .fetch_one(&mut *tx)
                                            .await?;
        volume.created_at = row.try_get("created_at")?;
        volume.updated_at = row.try_get("updated_at")?;
        volume.decommissioned_at = row.try_get("decommissioned_at")?;
        volume.decommissioned = volume.decommissioned_at.is_some();
        let ev = new_event(volume.app_id, volume.id.to_string(), EventType::Volume, EventOp::Update, &volume)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        Ok(volume)
    }

    pub async fn get(&self, id: Uuid) -> Result<Volume> {
        let pool = self.db.pool();
        let row = sqlx::query(VOLUME_SELECT).bind(id)
                                            .fetch_optional(&pool)
                                            .await?
                                            .ok_or_else(|| DomainError::not_found("volume"))?;
        volume_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<Volume>> {
        let pool = self.db.pool();
        let rows = sqlx::query(VOLUME_LIST).fetch_all(&pool).await?;
        rows.iter().map(volume_from_row).collect()
    }

    pub async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<Volume>> {
        let pool = self.db.pool();
        let rows = sqlx::query(VOLUME_LIST_BY_APP).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(volume_from_row).collect()
    }

    /// Marca el volumen como dado de baja. Repetirlo es un no-op.
    pub async fn decommission(&self, app_id: Uuid, id: Uuid) -> Result<Volume> {
        let mut tx = self.db.begin().await?;
        let done = sqlx::query(VOLUME_DECOMMISSION).bind(id).bind(app_id).fetch_optional(&mut *tx).await?;
        let row = sqlx::query(VOLUME_SELECT).bind(id)
                                            .fetch_optional(&mut *tx)
                                            .await?
                                            .ok_or_else(|| DomainError::not_found("volume"))?;
        let volume = volume_from_row(&row)?;
        if volume.app_id != Some(app_id) {
            return Err(DomainError::not_found("volume").into());
        }
        if done.is_some() {
            let ev = new_event(volume.app_id, volume.id.to_string(), EventType::Volume, EventOp::Update, &volume)?;
            insert_event(&mut tx, &ev).await?;
            info!("volume:decommissioned id={id} app={app_id}");
        }
        tx.commit().await?;
        Ok(volume)
    }
}
