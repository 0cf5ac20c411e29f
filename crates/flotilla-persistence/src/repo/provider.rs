use std::sync::Arc;

use async_trait::async_trait;
use flotilla_domain::{DomainError, EventOp, EventType, Provider, Resource};
use log::info;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::app::select_app;
use super::{ensure_id, json, Repository};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

fn provider_from_row(row: &PgRow) -> Result<Provider> {
    Ok(Provider { id: row.try_get("provider_id")?,
                  name: row.try_get("name")?,
                  url: row.try_get("url")?,
                  created_at: row.try_get("created_at")?,
                  updated_at: row.try_get("updated_at")? })
}

fn resource_from_row(row: &PgRow) -> Result<Resource> {
    Ok(Resource { id: row.try_get("resource_id")?,
                  provider_id: row.try_get("provider_id")?,
                  external_id: row.try_get("external_id")?,
                  env: json(row, "env")?,
                  apps: row.try_get("apps")?,
                  created_at: row.try_get("created_at")? })
}

async fn select_resource(conn: &mut PgConnection, id: Uuid) -> Result<Resource> {
    let row = sqlx::query(RESOURCE_SELECT).bind(id)
                                          .fetch_optional(&mut *conn)
                                          .await?
                                          .ok_or_else(|| DomainError::not_found("resource"))?;
    resource_from_row(&row)
}

/// Un evento `resource`/`resource_deletion` por app asociada; sin apps,
/// uno global.
async fn emit_resource(conn: &mut PgConnection, resource: &Resource, typ: EventType) -> Result<()> {
    if resource.apps.is_empty() {
        let ev = new_event(None, resource.id.to_string(), typ, EventOp::Create, resource)?;
        insert_event(conn, &ev).await?;
    }
    for app_id in &resource.apps {
        let ev = new_event(Some(*app_id), resource.id.to_string(), typ, EventOp::Create, resource)?;
        insert_event(conn, &ev).await?;
    }
    Ok(())
}

pub struct ProviderRepo {
    db: Arc<Db>,
}

impl ProviderRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    pub async fn add(&self, mut provider: Provider) -> Result<Provider> {
        provider.validate()?;
        provider.id = ensure_id(provider.id);
        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(PROVIDER_INSERT).bind(provider.id)
                                                   .bind(&provider.name)
                                                   .bind(&provider.url)
                                                   .fetch_one(&mut *tx)
                                                   .await;
        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                let e = crate::error::PersistenceError::from(e);
                if e.is_unique_violation() {
                    return Err(DomainError::conflict(format!("provider {:?} already exists", provider.name)).into());
                }
                return Err(e);
            }
        };
        provider.created_at = row.try_get("created_at")?;
        provider.updated_at = row.try_get("updated_at")?;
        let ev = new_event(None, provider.id.to_string(), EventType::Provider, EventOp::Create, &provider)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("provider:created id={} name={}", provider.id, provider.name);
        Ok(provider)
    }

    /// Por uuid o por nombre.
    pub async fn get(&self, id_or_name: &str) -> Result<Provider> {
        let pool = self.db.pool();
        let row = match Uuid::parse_str(id_or_name) {
            Ok(id) => sqlx::query(PROVIDER_SELECT_BY_ID).bind(id).fetch_optional(&pool).await?,
            Err(_) => sqlx::query(PROVIDER_SELECT_BY_NAME).bind(id_or_name).fetch_optional(&pool).await?,
        };
        match row {
            Some(r) => provider_from_row(&r),
            None => Err(DomainError::not_found("provider").into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<Provider>> {
        let pool = self.db.pool();
        let rows = sqlx::query(PROVIDER_LIST).fetch_all(&pool).await?;
        rows.iter().map(provider_from_row).collect()
    }
}

#[async_trait]
impl Repository for ProviderRepo {
    type Item = Provider;
    type Update = Provider;
    type Removed = Provider;

    const KIND: &'static str = "provider";

    async fn add(&self, item: Provider) -> Result<Provider> { ProviderRepo::add(self, item).await }

    async fn get(&self, id: &str) -> Result<Provider> { ProviderRepo::get(self, id).await }

    async fn list(&self) -> Result<Vec<Provider>> { ProviderRepo::list(self).await }
}

/// Recursos aprovisionados por un provider y sus asociaciones a apps.
pub struct ResourceRepo {
    db: Arc<Db>,
}

impl ResourceRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Inserta el recurso con sus asociaciones. Todas las apps deben existir.
    pub async fn add(&self, mut resource: Resource) -> Result<Resource> {
        resource.validate()?;
        resource.id = ensure_id(resource.id);
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(RESOURCE_INSERT).bind(resource.id)
                                              .bind(resource.provider_id)
                                              .bind(&resource.external_id)
                                              .bind(Json(&resource.env))
                                              .fetch_one(&mut *tx)
                                              .await?;
        resource.created_at = row.try_get("created_at")?;
        for app_id in &resource.apps {
            select_app(&mut tx, *app_id).await?;
            sqlx::query(APP_RESOURCE_INSERT).bind(app_id).bind(resource.id).execute(&mut *tx).await?;
        }
        emit_resource(&mut tx, &resource, EventType::Resource).await?;
        tx.commit().await?;
        info!("resource:created id={} provider={} apps={}", resource.id, resource.provider_id, resource.apps.len());
        Ok(resource)
    }

    pub async fn get(&self, id: Uuid) -> Result<Resource> {
        let mut conn = self.db.pool().acquire().await?;
        select_resource(&mut conn, id).await
    }

    pub async fn list(&self) -> Result<Vec<Resource>> {
        let pool = self.db.pool();
        let rows = sqlx::query(RESOURCE_LIST).fetch_all(&pool).await?;
        rows.iter().map(resource_from_row).collect()
    }

    pub async fn list_by_provider(&self, provider_id: Uuid) -> Result<Vec<Resource>> {
        let pool = self.db.pool();
        let rows = sqlx::query(RESOURCE_LIST_BY_PROVIDER).bind(provider_id).fetch_all(&pool).await?;
        rows.iter().map(resource_from_row).collect()
    }

    pub async fn list_by_app(&self, app_id: Uuid) -> Result<Vec<Resource>> {
        let pool = self.db.pool();
        let rows = sqlx::query(RESOURCE_LIST_BY_APP).bind(app_id).fetch_all(&pool).await?;
        rows.iter().map(resource_from_row).collect()
    }

    /// Asocia una app existente al recurso.
    pub async fn add_app(&self, resource_id: Uuid, app_id: Uuid) -> Result<Resource> {
        let mut tx = self.db.begin().await?;
        select_resource(&mut tx, resource_id).await?;
        select_app(&mut tx, app_id).await?;
        sqlx::query(APP_RESOURCE_INSERT).bind(app_id).bind(resource_id).execute(&mut *tx).await?;
        let resource = select_resource(&mut tx, resource_id).await?;
        let ev = new_event(Some(app_id), resource.id.to_string(), EventType::Resource, EventOp::Update, &resource)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        Ok(resource)
    }

    pub async fn remove_app(&self, resource_id: Uuid, app_id: Uuid) -> Result<Resource> {
        let mut tx = self.db.begin().await?;
        let done = sqlx::query(APP_RESOURCE_DELETE).bind(app_id).bind(resource_id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 {
            return Err(DomainError::not_found("resource").into());
        }
        let resource = select_resource(&mut tx, resource_id).await?;
        let ev = new_event(Some(app_id), resource.id.to_string(), EventType::Resource, EventOp::Update, &resource)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        Ok(resource)
    }

    /// Borrado lógico del recurso y de todas sus asociaciones.
    pub async fn remove(&self, id: Uuid) -> Result<Resource> {
        let mut tx = self.db.begin().await?;
        let resource = select_resource(&mut tx, id).await?;
        sqlx::query(APP_RESOURCE_DELETE_BY_RESOURCE).bind(id).execute(&mut *tx).await?;
        sqlx::query(RESOURCE_DELETE).bind(id).execute(&mut *tx).await?;
        emit_resource(&mut tx, &resource, EventType::ResourceDeletion).await?;
        tx.commit().await?;
        info!("resource:deleted id={id}");
        Ok(resource)
    }
}
