use std::sync::Arc;

use flotilla_core::NewQueueJob;
use flotilla_domain::{Backup, BackupStatus, DomainError, EventOp, EventType};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;
use crate::queue::enqueue;

/// Clase del trabajo de cola que genera y sube un backup.
pub const CLUSTER_BACKUP_JOB_CLASS: &str = "cluster_backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBackupJobArgs {
    pub id: Uuid,
}

fn backup_from_row(row: &PgRow) -> Result<Backup> {
    let status: String = row.try_get("status")?;
    Ok(Backup { id: row.try_get("backup_id")?,
                status: status.parse()?,
                sha512: row.try_get("sha512")?,
                size: row.try_get("size")?,
                error: row.try_get("error")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                completed_at: row.try_get("completed_at")? })
}

async fn emit(conn: &mut PgConnection, backup: &Backup, op: EventOp) -> Result<()> {
    let ev = new_event(None, backup.id.to_string(), EventType::ClusterBackup, op, backup)?;
    insert_event(conn, &ev).await?;
    Ok(())
}

async fn insert_running(conn: &mut PgConnection) -> Result<Backup> {
    let mut backup = Backup { id: Uuid::new_v4(),
                              status: BackupStatus::Running,
                              ..Backup::default() };
    let row = sqlx::query(BACKUP_INSERT).bind(backup.id)
                                        .bind(backup.status.as_str())
                                        .fetch_one(&mut *conn)
                                        .await?;
    backup.created_at = row.try_get("created_at")?;
    backup.updated_at = row.try_get("updated_at")?;
    emit(conn, &backup, EventOp::Create).await?;
    Ok(backup)
}

/// Registro de backups del cluster (`running` → `complete` | `error`).
pub struct BackupRepo {
    db: Arc<Db>,
}

impl BackupRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    pub async fn start(&self) -> Result<Backup> {
        let mut tx = self.db.begin().await?;
        let backup = insert_running(&mut tx).await?;
        tx.commit().await?;
        info!("backup:started id={}", backup.id);
        Ok(backup)
    }

    /// Registra un backup `running` y encola `cluster_backup` en la misma
    /// transacción.
    pub async fn schedule(&self) -> Result<Backup> {
        let mut tx = self.db.begin().await?;
        let backup = insert_running(&mut tx).await?;
        let args = serde_json::to_value(ClusterBackupJobArgs { id: backup.id })?;
        enqueue(&mut tx, &NewQueueJob::new(CLUSTER_BACKUP_JOB_CLASS, args)).await?;
        tx.commit().await?;
        info!("backup:scheduled id={}", backup.id);
        Ok(backup)
    }

    pub async fn get(&self, id: Uuid) -> Result<Backup> {
        let pool = self.db.pool();
        let row = sqlx::query(BACKUP_SELECT).bind(id)
                                            .fetch_optional(&pool)
                                            .await?
                                            .ok_or_else(|| DomainError::not_found("backup"))?;
        backup_from_row(&row)
    }

    /// Persiste estado, hash, tamaño y error; un estado final fija
    /// `completed_at`.
    pub async fn update(&self, mut backup: Backup) -> Result<Backup> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(BACKUP_UPDATE).bind(backup.id)
                                            .bind(backup.status.as_str())
                                            .bind(&backup.sha512)
                                            .bind(backup.size)
                                            .bind(&backup.error)
                                            .fetch_optional(&mut *tx)
                                            .await?
                                            .ok_or_else(|| DomainError::not_found("backup"))?;
        backup.updated_at = row.try_get("updated_at")?;
        backup.completed_at = row.try_get("completed_at")?;
        emit(&mut tx, &backup, EventOp::Update).await?;
        tx.commit().await?;
        info!("backup:updated id={} status={}", backup.id, backup.status);
        Ok(backup)
    }

    pub async fn latest(&self) -> Result<Option<Backup>> {
        let pool = self.db.pool();
        let row = sqlx::query(BACKUP_SELECT_LATEST).fetch_optional(&pool).await?;
        row.as_ref().map(backup_from_row).transpose()
    }
}
