use std::sync::Arc;

use async_trait::async_trait;
use flotilla_domain::{DomainError, EventOp, EventType, Sink};
use log::info;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use uuid::Uuid;

use super::{ensure_id, parse_id, Repository};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

fn sink_from_row(row: &PgRow) -> Result<Sink> {
    Ok(Sink { id: row.try_get("sink_id")?,
              kind: row.try_get("kind")?,
              config: row.try_get("config")?,
              created_at: row.try_get("created_at")?,
              updated_at: row.try_get("updated_at")? })
}

pub struct SinkRepo {
    db: Arc<Db>,
}

impl SinkRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    pub async fn add(&self, mut sink: Sink) -> Result<Sink> {
        sink.validate()?;
        sink.id = ensure_id(sink.id);
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(SINK_INSERT).bind(sink.id)
                                          .bind(&sink.kind)
                                          .bind(Json(&sink.config))
                                          .fetch_one(&mut *tx)
                                          .await?;
        sink.created_at = row.try_get("created_at")?;
        sink.updated_at = row.try_get("updated_at")?;
        let ev = new_event(None, sink.id.to_string(), EventType::Sink, EventOp::Create, &sink)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("sink:created id={} kind={}", sink.id, sink.kind);
        Ok(sink)
    }

    pub async fn get(&self, id: Uuid) -> Result<Sink> {
        let pool = self.db.pool();
        let row = sqlx::query(SINK_SELECT).bind(id)
                                          .fetch_optional(&pool)
                                          .await?
                                          .ok_or_else(|| DomainError::not_found("sink"))?;
        sink_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<Sink>> {
        let pool = self.db.pool();
        let rows = sqlx::query(SINK_LIST).fetch_all(&pool).await?;
        rows.iter().map(sink_from_row).collect()
    }

    pub async fn remove(&self, id: Uuid) -> Result<Sink> {
        let sink = self.get(id).await?;
        let mut tx = self.db.begin().await?;
        let done = sqlx::query(SINK_DELETE).bind(id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 {
            return Err(DomainError::not_found("sink").into());
        }
        let ev = new_event(None, id.to_string(), EventType::SinkDeletion, EventOp::Create, &sink)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("sink:deleted id={id}");
        Ok(sink)
    }
}

#[async_trait]
impl Repository for SinkRepo {
    type Item = Sink;
    type Update = Sink;
    type Removed = Sink;

    const KIND: &'static str = "sink";

    async fn add(&self, item: Sink) -> Result<Sink> { SinkRepo::add(self, item).await }

    async fn get(&self, id: &str) -> Result<Sink> { SinkRepo::get(self, parse_id(id, Self::KIND)?).await }

    async fn list(&self) -> Result<Vec<Sink>> { SinkRepo::list(self).await }

    async fn remove(&self, id: &str) -> Result<Sink> { SinkRepo::remove(self, parse_id(id, Self::KIND)?).await }
}
