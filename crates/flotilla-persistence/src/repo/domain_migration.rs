use std::sync::Arc;

use flotilla_core::NewQueueJob;
use flotilla_domain::{DomainError, DomainMigration, EventOp, EventType};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;
use crate::queue::enqueue;

/// Clase del trabajo de cola que mueve las rutas al dominio nuevo.
pub const DOMAIN_MIGRATION_JOB_CLASS: &str = "domain_migration";

/// Argumentos del trabajo `domain_migration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMigrationJobArgs {
    pub id: Uuid,
}

fn domain_migration_from_row(row: &PgRow) -> Result<DomainMigration> {
    Ok(DomainMigration { id: row.try_get("migration_id")?,
                         old_domain: row.try_get("old_domain")?,
                         domain: row.try_get("domain")?,
                         created_at: row.try_get("created_at")?,
                         finished_at: row.try_get("finished_at")? })
}

pub struct DomainMigrationRepo {
    db: Arc<Db>,
    default_domain: String,
}

impl DomainMigrationRepo {
    /// `default_domain` hace de dominio previo cuando aún no hubo
    /// migraciones.
    pub fn new(db: Arc<Db>, default_domain: &str) -> Self {
        Self { db,
               default_domain: default_domain.to_string() }
    }

    /// Registra la migración hacia `domain` y encola su trabajo en la misma
    /// transacción.
    pub async fn add(&self, domain: &str) -> Result<DomainMigration> {
        let old_domain = match self.latest().await? {
            Some(last) => last.domain,
            None => self.default_domain.clone(),
        };
        let mut dm = DomainMigration { id: Uuid::new_v4(),
                                       old_domain,
                                       domain: domain.to_string(),
                                       created_at: None,
                                       finished_at: None };
        dm.validate()?;
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(DOMAIN_MIGRATION_INSERT).bind(dm.id)
                                                      .bind(&dm.old_domain)
                                                      .bind(&dm.domain)
                                                      .fetch_one(&mut *tx)
                                                      .await?;
        dm.created_at = row.try_get("created_at")?;
        let args = serde_json::to_value(DomainMigrationJobArgs { id: dm.id })?;
        enqueue(&mut tx, &NewQueueJob::new(DOMAIN_MIGRATION_JOB_CLASS, args)).await?;
        tx.commit().await?;
        info!("domain_migration:created id={} old={} new={}", dm.id, dm.old_domain, dm.domain);
        Ok(dm)
    }

    pub async fn get(&self, id: Uuid) -> Result<DomainMigration> {
        let pool = self.db.pool();
        let row = sqlx::query(DOMAIN_MIGRATION_SELECT).bind(id)
                                                      .fetch_optional(&pool)
                                                      .await?
                                                      .ok_or_else(|| DomainError::not_found("domain migration"))?;
        domain_migration_from_row(&row)
    }

    pub async fn latest(&self) -> Result<Option<DomainMigration>> {
        let pool = self.db.pool();
        let row = sqlx::query(DOMAIN_MIGRATION_SELECT_LATEST).fetch_optional(&pool).await?;
        row.as_ref().map(domain_migration_from_row).transpose()
    }

    /// Marca la migración como terminada y emite `domain_migration`.
    pub async fn finish(&self, id: Uuid) -> Result<DomainMigration> {
        let mut dm = self.get(id).await?;
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(DOMAIN_MIGRATION_FINISH).bind(id).fetch_one(&mut *tx).await?;
        dm.finished_at = row.try_get("finished_at")?;
        let ev = new_event(None, dm.id.to_string(), EventType::DomainMigration, EventOp::Update, &dm)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("domain_migration:finished id={id} domain={}", dm.domain);
        Ok(dm)
    }
}
