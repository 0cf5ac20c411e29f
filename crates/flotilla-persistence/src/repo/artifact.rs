use std::sync::Arc;

use async_trait::async_trait;
use flotilla_domain::{Artifact, DomainError, EventOp, EventType};
use log::{debug, info};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::{ensure_id, json, parse_id, Repository};
use crate::db::Db;
use crate::error::Result;
use crate::events::{insert_event, new_event};
use crate::queries::*;

pub(crate) fn artifact_from_row(row: &PgRow) -> Result<Artifact> {
    let artifact_type: String = row.try_get("type")?;
    Ok(Artifact { id: row.try_get("artifact_id")?,
                  artifact_type: artifact_type.parse()?,
                  uri: row.try_get("uri")?,
                  meta: json(row, "meta")?,
                  hashes: json(row, "hashes")?,
                  size: row.try_get("size")?,
                  raw_manifest: row.try_get("manifest")?,
                  layer_url_template: row.try_get("layer_url_template")?,
                  created_at: row.try_get("created_at")? })
}

pub(crate) async fn select_artifacts(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Artifact>> {
    let rows = sqlx::query(ARTIFACT_LIST_IDS).bind(ids).fetch_all(&mut *conn).await?;
    let mut found = rows.iter().map(artifact_from_row).collect::<Result<Vec<_>>>()?;
    // Mismo orden que `ids`.
    found.sort_by_key(|a| ids.iter().position(|id| *id == a.id));
    Ok(found)
}

pub struct ArtifactRepo {
    db: Arc<Db>,
}

impl ArtifactRepo {
    pub fn new(db: Arc<Db>) -> Self { Self { db } }

    /// Idempotente sobre `(type, uri)`: si ya existe un artifact vivo con ese
    /// par se devuelve tal cual y no se emite evento.
    pub async fn add(&self, mut artifact: Artifact) -> Result<Artifact> {
        artifact.validate()?;
        if let Some(existing) = self.find(&artifact).await? {
            debug!("artifact:dedup id={} uri={}", existing.id, existing.uri);
            return Ok(existing);
        }
        artifact.id = ensure_id(artifact.id);
        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(ARTIFACT_INSERT).bind(artifact.id)
                                                   .bind(artifact.artifact_type.as_str())
                                                   .bind(&artifact.uri)
                                                   .bind(Json(&artifact.meta))
                                                   .bind(Json(&artifact.hashes))
                                                   .bind(artifact.size)
                                                   .bind(&artifact.raw_manifest)
                                                   .bind(&artifact.layer_url_template)
                                                   .fetch_one(&mut *tx)
                                                   .await;
        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                let e = crate::error::PersistenceError::from(e);
                // Carrera con otro insert del mismo par: gana la fila existente.
                if e.is_unique_violation() {
                    drop(tx);
                    return self.find(&artifact).await?.ok_or(e);
                }
                return Err(e);
            }
        };
        let created = artifact_from_row(&row)?;
        let ev = new_event(None, created.id.to_string(), EventType::Artifact, EventOp::Create, &created)?;
        insert_event(&mut tx, &ev).await?;
        tx.commit().await?;
        info!("artifact:created id={} type={}", created.id, created.artifact_type);
        Ok(created)
    }

    async fn find(&self, artifact: &Artifact) -> Result<Option<Artifact>> {
        let pool = self.db.pool();
        let row = sqlx::query(ARTIFACT_SELECT_BY_TYPE_AND_URI).bind(artifact.artifact_type.as_str())
                                                              .bind(&artifact.uri)
                                                              .fetch_optional(&pool)
                                                              .await?;
        row.as_ref().map(artifact_from_row).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Artifact> {
        let pool = self.db.pool();
        let row = sqlx::query(ARTIFACT_SELECT).bind(id)
                                              .fetch_optional(&pool)
                                              .await?
                                              .ok_or_else(|| DomainError::not_found("artifact"))?;
        artifact_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<Artifact>> {
        let pool = self.db.pool();
        let rows = sqlx::query(ARTIFACT_LIST).fetch_all(&pool).await?;
        rows.iter().map(artifact_from_row).collect()
    }

    /// Artifacts en el orden de `ids`; los ausentes se omiten.
    pub async fn list_ids(&self, ids: &[Uuid]) -> Result<Vec<Artifact>> {
        let mut conn = self.db.pool().acquire().await?;
        select_artifacts(&mut conn, ids).await
    }
}

#[async_trait]
impl Repository for ArtifactRepo {
    type Item = Artifact;
    type Update = Artifact;
    type Removed = Artifact;

    const KIND: &'static str = "artifact";

    async fn add(&self, item: Artifact) -> Result<Artifact> { ArtifactRepo::add(self, item).await }

    async fn get(&self, id: &str) -> Result<Artifact> { ArtifactRepo::get(self, parse_id(id, Self::KIND)?).await }

    async fn list(&self) -> Result<Vec<Artifact>> { ArtifactRepo::list(self).await }
}
