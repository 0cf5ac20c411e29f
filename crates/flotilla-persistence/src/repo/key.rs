use std::sync::Arc;

use async_trait::async_trait;
use flotilla_domain::{DomainError, EventOp, EventType, Key};
use log::info;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::Repository;
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

fn key_from_row(row: &PgRow) -> Result<Key> {
    Ok(Key { id: row.try_get("key_id")?,
             key: row.try_get("key")?,
             comment: row.try_get("comment")?,
             created_at: row.try_get("created_at")? })
}

/// Claves SSH autorizadas. El id es el fingerprint MD5 del blob.
pub struct KeyRepo {
    db: Arc<Db>,
}

impl KeyRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Parsea la línea `authorized_keys` recibida en `key.key`. Re-añadir una
    /// clave existente actualiza el comentario.
    pub async fn add(&self, key: Key) -> Result<Key> {
        let mut parsed = Key::parse(&key.key)?;
        if parsed.comment.is_empty() {
            parsed.comment = key.comment;
        }
        let mut tx = self.db.begin().await?;
        let row = sqlx::query(KEY_INSERT).bind(&parsed.id)
                                         .bind(&parsed.key)
                                         .bind(&parsed.comment)
                                         .fetch_one(&mut *tx)
                                         .await?;
        parsed.created_at = row.try_get("created_at")?;
        let ev = new_event(None, parsed.id.clone(), EventType::Key, EventOp::Create, &parsed)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("key:added fingerprint={}", parsed.colon_fingerprint());
        Ok(parsed)
    }

    /// Por fingerprint, con o sin `:`.
    pub async fn get(&self, id: &str) -> Result<Key> {
        let id = id.replace(':', "");
        let pool = self.db.pool();
        let row = sqlx::query(KEY_SELECT).bind(&id)
                                         .fetch_optional(&pool)
                                         .await?
                                         .ok_or_else(|| DomainError::not_found("key"))?;
        key_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<Key>> {
        let pool = self.db.pool();
        let rows = sqlx::query(KEY_LIST).fetch_all(&pool).await?;
        rows.iter().map(key_from_row).collect()
    }

    pub async fn remove(&self, id: &str) -> Result<Key> {
        let key = self.get(id).await?;
        let mut tx = self.db.begin().await?;
        sqlx::query(KEY_DELETE).bind(&key.id).execute(&mut *tx).await?;
        let ev = new_event(None, key.id.clone(), EventType::KeyDeletion, EventOp::Create, &key)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("key:deleted fingerprint={}", key.colon_fingerprint());
        Ok(key)
    }
}

#[async_trait]
impl Repository for KeyRepo {
    type Item = Key;
    type Update = Key;
    type Removed = Key;

    const KIND: &'static str = "key";

    async fn add(&self, item: Key) -> Result<Key> { KeyRepo::add(self, item).await }

    async fn get(&self, id: &str) -> Result<Key> { KeyRepo::get(self, id).await }

    async fn list(&self) -> Result<Vec<Key>> { KeyRepo::list(self).await }

    async fn remove(&self, id: &str) -> Result<Key> { KeyRepo::remove(self, id).await }
}
