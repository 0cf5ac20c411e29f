//! Repositorios Postgres.
//!
//! Contrato común:
//! - `add`: valida, inserta, emite el evento en la misma transacción y
//!   devuelve la entidad con id y timestamps.
//! - `get`: por uuid (o por nombre en entidades con nombre).
//! - `list`: más recientes primero.
//! - `update` / `remove`: read-modify-write transaccional; `remove` es un
//!   borrado lógico que emite `<tipo>_deletion`.
//!
//! [`Repository`] recoge ese contrato para los recursos que el API expone
//! con handlers CRUD genéricos.

mod app;
mod artifact;
mod backup;
mod deployment;
mod domain_migration;
mod formation;
mod job;
mod key;
mod provider;
mod release;
mod scale;
mod sink;
mod volume;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flotilla_domain::DomainError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{PersistenceError, Result};

pub use app::{AppDeletion, AppRelease, AppRepo, AppUpdate};
pub use artifact::ArtifactRepo;
pub use backup::{BackupRepo, ClusterBackupJobArgs, CLUSTER_BACKUP_JOB_CLASS};
pub use deployment::{DeploymentJobArgs, DeploymentRepo, NewDeployment, DEPLOYMENT_JOB_CLASS};
pub use domain_migration::{DomainMigrationJobArgs, DomainMigrationRepo, DOMAIN_MIGRATION_JOB_CLASS};
pub use formation::{FormationDeletion, FormationRepo};
pub use job::JobRepo;
pub use key::KeyRepo;
pub use provider::{ProviderRepo, ResourceRepo};
pub use release::{ReleaseDeletion, ReleaseRepo};
pub use scale::ScaleRequestRepo;
pub use sink::SinkRepo;
pub use volume::VolumeRepo;

/// Capacidades CRUD sobre las que el API monta sus handlers genéricos.
///
/// `update` y `remove` tienen una implementación por defecto que rechaza la
/// operación: artefactos y providers son inmutables, un release sólo se
/// borra.
#[async_trait]
pub trait Repository: Send + Sync {
    type Item: Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Cambios parciales aceptados por `update`.
    type Update: DeserializeOwned + Send + 'static;
    /// Lo que devuelve `remove` (la entidad o el payload de borrado).
    type Removed: Serialize + Send + 'static;

    /// Nombre del recurso en mensajes de error (`"app"`, `"key"`...).
    const KIND: &'static str;

    async fn add(&self, item: Self::Item) -> Result<Self::Item>;
    async fn get(&self, id: &str) -> Result<Self::Item>;
    async fn list(&self) -> Result<Vec<Self::Item>>;

    async fn update(&self, _id: &str, _update: Self::Update) -> Result<Self::Item> { Err(unsupported(Self::KIND, "updated")) }

    async fn remove(&self, _id: &str) -> Result<Self::Removed> { Err(unsupported(Self::KIND, "deleted")) }
}

pub(crate) fn unsupported(kind: &str, verb: &str) -> PersistenceError {
    DomainError::validation(kind, format!("cannot be {verb}")).into()
}

/// Cursor de paginación keyset `(updated_at, id)`, descendente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken {
    pub before: DateTime<Utc>,
    pub id: Uuid,
}

impl PageToken {
    pub fn encode(&self) -> String { format!("{}:{}", self.before.timestamp_micros(), self.id) }

    pub fn decode(token: &str) -> std::result::Result<Self, DomainError> {
        let bad = || DomainError::validation("page_token", "is invalid");
        let (ts, id) = token.split_once(':').ok_or_else(bad)?;
        let micros: i64 = ts.parse().map_err(|_| bad())?;
        Ok(Self { before: DateTime::from_timestamp_micros(micros).ok_or_else(bad)?,
                  id: Uuid::parse_str(id).map_err(|_| bad())? })
    }
}

/// Página de resultados y cursor de la siguiente (si hay más).
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageToken>,
}

pub(crate) fn json<T: DeserializeOwned>(row: &PgRow, col: &str) -> Result<T> {
    let Json(v): Json<T> = row.try_get(col)?;
    Ok(v)
}

pub(crate) fn json_opt<T: DeserializeOwned>(row: &PgRow, col: &str) -> Result<Option<T>> {
    let v: Option<Json<T>> = row.try_get(col)?;
    Ok(v.map(|Json(v)| v))
}

/// Convierte `RowNotFound` en el `NotFound` de dominio con nombre.
pub(crate) fn not_found(what: &str) -> impl FnOnce(PersistenceError) -> PersistenceError + '_ {
    move |e| match e {
        PersistenceError::NotFound => DomainError::not_found(what).into(),
        other => other,
    }
}

/// Id nulo => uno nuevo.
pub(crate) fn ensure_id(id: Uuid) -> Uuid {
    if id.is_nil() {
        Uuid::new_v4()
    } else {
        id
    }
}

/// Acepta un uuid en texto; cualquier otra cosa es "no encontrado".
pub(crate) fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| DomainError::not_found(what).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_token_survives_encoding() {
        let token = PageToken { before: DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap(),
                                id: Uuid::new_v4() };
        assert_eq!(PageToken::decode(&token.encode()).unwrap(), token);
        assert!(PageToken::decode("garbage").is_err());
        assert!(PageToken::decode("12:not-a-uuid").is_err());
    }

    #[test]
    fn nil_ids_are_replaced() {
        assert!(!ensure_id(Uuid::nil()).is_nil());
        let id = Uuid::new_v4();
        assert_eq!(ensure_id(id), id);
    }
}
