use std::sync::Arc;

use async_trait::async_trait;
use flotilla_domain::{App, DeploymentStrategy, DomainError, EventOp, EventType, Labels, NameGenerator, Release};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::{ensure_id, json, not_found, Page, PageToken, Repository};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

// Intentos de generar un nombre libre antes de rendirse.
const NAME_ATTEMPTS: u32 = 10;

/// Cambios admitidos sobre una app existente. Campos ausentes no se tocan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppUpdate {
    pub meta: Option<Labels>,
    pub strategy: Option<DeploymentStrategy>,
    pub deploy_timeout: Option<i32>,
}

/// Payload de `app_deletion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDeletion {
    pub app: App,
    pub deleted_releases: Vec<Uuid>,
    pub deleted_resources: Vec<Uuid>,
}

/// Payload de `app_release`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRelease {
    pub release: Release,
    pub prev_release: Option<Release>,
}

pub(crate) fn app_from_row(row: &PgRow) -> Result<App> {
    let strategy: String = row.try_get("strategy")?;
    Ok(App { id: row.try_get("app_id")?,
             name: row.try_get("name")?,
             meta: json(row, "meta")?,
             strategy: strategy.parse()?,
             release_id: row.try_get("release_id")?,
             deploy_timeout: row.try_get("deploy_timeout")?,
             created_at: row.try_get("created_at")?,
             updated_at: row.try_get("updated_at")? })
}

/// App por id, dentro de una transacción y con la fila bloqueada.
pub(crate) async fn lock_app(conn: &mut PgConnection, id: Uuid) -> Result<App> {
    let row = sqlx::query(APP_SELECT_BY_ID_FOR_UPDATE).bind(id)
                                                      .fetch_optional(&mut *conn)
                                                      .await?
                                                      .ok_or_else(|| DomainError::not_found("app"))?;
    app_from_row(&row)
}

pub(crate) async fn select_app(conn: &mut PgConnection, id: Uuid) -> Result<App> {
    let row = sqlx::query(APP_SELECT_BY_ID).bind(id)
                                           .fetch_optional(&mut *conn)
                                           .await?
                                           .ok_or_else(|| DomainError::not_found("app"))?;
    app_from_row(&row)
}

pub struct AppRepo {
    db: Arc<Db>,
    names: Arc<NameGenerator>,
}

impl AppRepo {
    pub fn new(db: Arc<Db>, names: Arc<NameGenerator>) -> Self { Self { db, names } }

    /// Crea la app. Sin nombre se genera uno `<adjetivo>-<sustantivo>`,
    /// reintentando con sufijo ante colisión.
    pub async fn add(&self, mut app: App) -> Result<App> {
        app.id = ensure_id(app.id);
        let generated = app.name.is_empty();
        for attempt in 0..NAME_ATTEMPTS {
            if generated {
                app.name = self.names.generate(attempt);
            }
            app.validate()?;
            match self.insert(&app).await {
                Err(e) if e.is_unique_violation() && generated => {
                    debug!("app:name_taken name={} attempt={attempt}", app.name);
                    continue;
                }
                Err(e) if e.is_unique_violation() => {
                    return Err(DomainError::conflict(format!("application {:?} already exists", app.name)).into());
                }
                other => return other,
            }
        }
        Err(DomainError::conflict("unable to generate a unique app name").into())
    }

    async fn insert(&self, app: &App) -> Result<App> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(APP_INSERT).bind(app.id)
                                         .bind(&app.name)
                                         .bind(Json(&app.meta))
                                         .bind(app.strategy.as_str())
                                         .bind(app.deploy_timeout)
                                         .fetch_one(&mut *tx)
                                         .await?;
        let created = app_from_row(&row)?;
        let ev = new_event(Some(created.id), created.id.to_string(), EventType::App, EventOp::Create, &created)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("app:created id={} name={}", created.id, created.name);
        Ok(created)
    }

    /// Busca por uuid o, si no lo es, por nombre.
    pub async fn get(&self, id_or_name: &str) -> Result<App> {
        let pool = self.db.pool();
        let row = match Uuid::parse_str(id_or_name) {
            Ok(id) => sqlx::query(APP_SELECT_BY_ID).bind(id).fetch_optional(&pool).await?,
            Err(_) => sqlx::query(APP_SELECT_BY_NAME).bind(id_or_name).fetch_optional(&pool).await?,
        };
        match row {
            Some(r) => app_from_row(&r),
            None => Err(DomainError::not_found("app").into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<App>> {
        let pool = self.db.pool();
        let rows = sqlx::query(APP_LIST).fetch_all(&pool).await?;
        rows.iter().map(app_from_row).collect()
    }

    /// Página keyset por `(updated_at, id)` descendente.
    pub async fn list_page(&self, size: i64, token: Option<PageToken>) -> Result<Page<App>> {
        let size = size.clamp(1, 1000);
        let pool = self.db.pool();
        let rows = sqlx::query(APP_LIST_PAGE).bind(token.map(|t| t.before))
                                             .bind(token.map(|t| t.id))
                                             .bind(size + 1)
                                             .fetch_all(&pool)
                                             .await?;
        let mut items = rows.iter().map(app_from_row).collect::<Result<Vec<_>>>()?;
        let next = if items.len() as i64 > size {
            items.truncate(size as usize);
            items.last().and_then(|a| a.updated_at.map(|before| PageToken { before, id: a.id }))
        } else {
            None
        };
        Ok(Page { items, next })
    }

    pub async fn update(&self, id: Uuid, update: AppUpdate) -> Result<App> {
        let mut tx = self.db.begin().await?;
        let mut app = lock_app(&mut tx, id).await?;
        if let Some(meta) = update.meta {
            app.meta = meta;
        }
        if let Some(strategy) = update.strategy {
            app.strategy = strategy;
        }
        if let Some(timeout) = update.deploy_timeout {
            app.deploy_timeout = timeout;
        }
        app.validate()?;
        let row = sqlx::query(APP_UPDATE).bind(app.id)
                                         .bind(&app.name)
                                         .bind(Json(&app.meta))
                                         .bind(app.strategy.as_str())
                                         .bind(app.deploy_timeout)
                                         .fetch_one(&mut *tx)
                                         .await?;
        let updated = app_from_row(&row)?;
        let ev = new_event(Some(updated.id), updated.id.to_string(), EventType::App, EventOp::Update, &updated)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Borrado lógico de la app, sus formaciones y releases; desvincula sus
    /// recursos. Las apps protegidas no se borran.
    pub async fn remove(&self, id: Uuid) -> Result<AppDeletion> {
        let mut tx = self.db.begin().await?;
        let app = lock_app(&mut tx, id).await?;
        if app.is_protected() {
            return Err(DomainError::validation("app", format!("{} is a protected system app and cannot be deleted", app.name)).into());
        }
        sqlx::query(APP_DELETE).bind(id).execute(&mut *tx).await?;
        sqlx::query(FORMATION_DELETE_BY_APP).bind(id).execute(&mut *tx).await?;
        let deleted_releases: Vec<Uuid> = sqlx::query(RELEASE_DELETE_BY_APP).bind(id)
                                                                             .fetch_all(&mut *tx)
                                                                             .await?
                                                                             .iter()
                                                                             .map(|r| r.try_get("release_id"))
                                                                             .collect::<std::result::Result<_, _>>()?;
        let deleted_resources: Vec<Uuid> = sqlx::query(APP_RESOURCE_DELETE_BY_APP).bind(id)
                                                                                   .fetch_all(&mut *tx)
                                                                                   .await?
                                                                                   .iter()
                                                                                   .map(|r| r.try_get("resource_id"))
                                                                                   .collect::<std::result::Result<_, _>>()?;
        let deletion = AppDeletion { app,
                                     deleted_releases,
                                     deleted_resources };
        let ev = new_event(Some(id), id.to_string(), EventType::AppDeletion, EventOp::Create, &deletion)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("app:deleted id={id} releases={}", deletion.deleted_releases.len());
        Ok(deletion)
    }

    /// Fija el release actual. Un release sin app queda ligado a ésta; uno de
    /// otra app es rechazado.
    pub async fn set_release(&self, app_id: Uuid, release_id: Uuid) -> Result<App> {
        let mut tx = self.db.begin().await?;
        let app = lock_app(&mut tx, app_id).await?;
        set_release_tx(&mut tx, &app, release_id).await?;
        let app = select_app(&mut tx, app_id).await?;
        tx.commit().await?;
        Ok(app)
    }

    pub async fn get_release(&self, app_id: Uuid) -> Result<Release> {
        let app = self.get(&app_id.to_string()).await?;
        let release_id = app.release_id.ok_or_else(|| DomainError::not_found("release"))?;
        let mut conn = self.db.pool().acquire().await?;
        super::release::select_release(&mut conn, release_id).await
    }
}

/// Parte transaccional de `set_release`, reutilizada por los despliegues.
pub(crate) async fn set_release_tx(conn: &mut PgConnection, app: &App, release_id: Uuid) -> Result<()> {
    let mut release = super::release::select_release(conn, release_id).await
                                                                       .map_err(not_found("release"))?;
    match release.app_id {
        Some(owner) if owner != app.id => return Err(DomainError::not_found("release").into()),
        Some(_) => {}
        None => {
            sqlx::query(RELEASE_ATTACH).bind(release_id).bind(app.id).execute(&mut *conn).await?;
            release.app_id = Some(app.id);
        }
    }
    let prev_release = match app.release_id {
        Some(prev) if prev != release_id => Some(super::release::select_release(conn, prev).await?),
        _ => None,
    };
    sqlx::query(APP_UPDATE_RELEASE).bind(app.id).bind(release_id).execute(&mut *conn).await?;
    let payload = AppRelease { release, prev_release };
    let ev = new_event(Some(app.id), app.id.to_string(), EventType::AppRelease, EventOp::Create, &payload)?;
    insert_event(conn, &ev).await?;
    info!("app:release app={} release={release_id}", app.id);
    Ok(())
}

#[async_trait]
impl Repository for AppRepo {
    type Item = App;
    type Update = AppUpdate;
    type Removed = AppDeletion;

    const KIND: &'static str = "app";

    async fn add(&self, item: App) -> Result<App> { AppRepo::add(self, item).await }

    async fn get(&self, id: &str) -> Result<App> { AppRepo::get(self, id).await }

    async fn list(&self) -> Result<Vec<App>> { AppRepo::list(self).await }

    async fn update(&self, id: &str, update: AppUpdate) -> Result<App> {
        let app = AppRepo::get(self, id).await?;
        AppRepo::update(self, app.id, update).await
    }

    async fn remove(&self, id: &str) -> Result<AppDeletion> {
        let app = AppRepo::get(self, id).await?;
        AppRepo::remove(self, app.id).await
    }
}
