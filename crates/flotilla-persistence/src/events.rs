//! Event log durable.
//!
//! Toda mutación de un repositorio inserta su evento con `insert_event` sobre
//! la MISMA transacción que modifica la fila del objeto; el trigger
//! `notify_event` publica el id tras el commit.

use std::sync::Arc;

use async_trait::async_trait;
use flotilla_core::{CoreError, EventQuery, EventStore, NewEvent};
use flotilla_domain::{DomainError, Event, EventOp, EventType};
use log::debug;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::db::{with_retry, Db};
use crate::error::{PersistenceError, Result};
use crate::queries::{EVENT_INSERT, EVENT_INSERT_UNIQUE, EVENT_SELECT};

/// Construye un `NewEvent` serializando `data`.
pub(crate) fn new_event<T: Serialize>(app_id: Option<Uuid>,
                                      object_id: impl Into<String>,
                                      object_type: EventType,
                                      op: EventOp,
                                      data: &T)
                                      -> Result<NewEvent> {
    NewEvent::new(app_id, object_id, object_type, op, data).map_err(|e| PersistenceError::Decode(e.to_string()))
}

/// Inserta un evento en la conexión/transacción dada. Con `unique_id`, un
/// conflicto es un no-op y devuelve `None`.
pub(crate) async fn insert_event(conn: &mut PgConnection, ev: &NewEvent) -> Result<Option<Event>> {
    let row = match &ev.unique_id {
        None => {
            Some(sqlx::query(EVENT_INSERT).bind(ev.app_id)
                                          .bind(&ev.object_id)
                                          .bind(ev.object_type.as_str())
                                          .bind(ev.op.as_str())
                                          .bind(&ev.data)
                                          .fetch_one(&mut *conn)
                                          .await?)
        }
        Some(uid) => {
            sqlx::query(EVENT_INSERT_UNIQUE).bind(ev.app_id)
                                            .bind(&ev.object_id)
                                            .bind(uid)
                                            .bind(ev.object_type.as_str())
                                            .bind(ev.op.as_str())
                                            .bind(&ev.data)
                                            .fetch_optional(&mut *conn)
                                            .await?
        }
    };
    let Some(row) = row else {
        debug!("event:dedup object_type={} object_id={}", ev.object_type, ev.object_id);
        return Ok(None);
    };
    Ok(Some(Event { id: row.try_get("event_id")?,
                    app_id: ev.app_id,
                    object_id: ev.object_id.clone(),
                    object_type: ev.object_type,
                    op: ev.op,
                    data: ev.data.clone(),
                    created_at: row.try_get("created_at")? }))
}

pub(crate) fn event_from_row(row: &PgRow) -> Result<Event> {
    let object_type: String = row.try_get("object_type")?;
    let op: String = row.try_get("op")?;
    Ok(Event { id: row.try_get("event_id")?,
               app_id: row.try_get("app_id")?,
               object_id: row.try_get("object_id")?,
               object_type: object_type.parse()?,
               op: op.parse()?,
               data: row.try_get("data")?,
               created_at: row.try_get("created_at")? })
}

/// Implementación Postgres de `EventStore`.
#[derive(Clone)]
pub struct PgEventStore {
    db: Arc<Db>,
}

impl PgEventStore {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    pub async fn fetch(&self, id: i64) -> Result<Event> {
        let pool = self.db.pool();
        let row = sqlx::query(EVENT_SELECT).bind(id).fetch_optional(&pool).await?;
        match row {
            Some(r) => event_from_row(&r),
            None => Err(DomainError::not_found(format!("event {id}")).into()),
        }
    }

    pub async fn query(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let pool = self.db.pool();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT event_id, app_id, object_id, object_type, op, data, created_at \
                                                    FROM events WHERE true");
        if let Some(app) = query.filter.app_id {
            qb.push(" AND app_id = ").push_bind(app);
        }
        if !query.filter.object_types.is_empty() {
            let types: Vec<String> = query.filter.object_types.iter().map(|t| t.as_str().to_string()).collect();
            qb.push(" AND object_type = ANY(").push_bind(types).push(")");
        }
        if let Some(object_id) = query.filter.object_id.as_ref().filter(|id| !id.is_empty()) {
            qb.push(" AND object_id = ").push_bind(object_id.clone());
        }
        if let Some(since) = query.since_id {
            qb.push(" AND event_id > ").push_bind(since);
        }
        if let Some(before) = query.before_id {
            qb.push(" AND event_id < ").push_bind(before);
        }
        qb.push(if query.ascending { " ORDER BY event_id ASC" } else { " ORDER BY event_id DESC" });
        if let Some(count) = query.count {
            qb.push(" LIMIT ").push_bind(count.max(0));
        }
        let rows = qb.build().fetch_all(&pool).await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Id del evento más reciente (0 si el log está vacío).
    pub async fn high_water_mark(&self) -> Result<i64> {
        let pool = self.db.pool();
        let row = sqlx::query("SELECT coalesce(max(event_id), 0) AS id FROM events").fetch_one(&pool).await?;
        Ok(row.try_get("id")?)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> std::result::Result<Option<Event>, CoreError> {
        let (db, event) = (&self.db, &event);
        let out = with_retry(|| async move {
                      let mut conn = db.pool().acquire().await?;
                      insert_event(&mut conn, event).await
                  }).await?;
        Ok(out)
    }

    async fn get(&self, id: i64) -> std::result::Result<Event, CoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn list(&self, query: &EventQuery) -> std::result::Result<Vec<Event>, CoreError> {
        Ok(with_retry(|| self.query(query)).await?)
    }
}
