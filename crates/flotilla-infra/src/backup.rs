//! Backup del estado del controlador.
//!
//! El archivo es un tar con un directorio `flynn-backup-<fecha>/` que
//! contiene:
//! - `flynn.json`: nombre de app → formación expandida del release actual.
//! - `controller.json`: `{"event_id_high_water_mark": N}`.
//!
//! `GET /backup` lo sirve directamente; el worker `cluster_backup` lo sube
//! al blobstore y deja constancia en `backups`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flotilla_adapters::blobstore::TAR_CONTENT_TYPE;
use flotilla_adapters::BlobstoreClient;
use flotilla_core::{JobError, JobHandler, QueueJob};
use flotilla_domain::{Backup, BackupStatus, ExpandedFormation};
use flotilla_persistence::{BackupRepo, ClusterBackupJobArgs, FormationRepo, PgEventStore};
use log::{error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::{InfraError, Result};

pub const FLYNN_JSON: &str = "flynn.json";
pub const CONTROLLER_JSON: &str = "controller.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub event_id_high_water_mark: i64,
}

/// Archivo generado, con su digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub name: String,
    pub bytes: Vec<u8>,
    /// SHA-512 en hex.
    pub sha512: String,
    pub size: i64,
}

/// Una formación por app: la del release actual si está activa, si no la
/// primera activa.
pub fn apps_snapshot(formations: Vec<ExpandedFormation>) -> BTreeMap<String, ExpandedFormation> {
    let mut out: BTreeMap<String, ExpandedFormation> = BTreeMap::new();
    for ef in formations {
        let current = ef.app.release_id == Some(ef.release.id);
        match out.get(&ef.app.name) {
            Some(prev) if !current || prev.app.release_id == Some(prev.release.id) => {}
            _ => {
                out.insert(ef.app.name.clone(), ef);
            }
        }
    }
    out
}

fn append_json<T: Serialize>(tar: &mut tar::Builder<Vec<u8>>, dir: &str, name: &str, value: &T, mtime: u64) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    tar.append_data(&mut header, format!("{dir}/{name}"), data.as_slice())?;
    Ok(())
}

pub fn write_archive(apps: &BTreeMap<String, ExpandedFormation>, state: ControllerState, now: DateTime<Utc>) -> Result<BackupArchive> {
    let name = format!("flynn-backup-{}", now.format("%Y-%m-%d_%H%M%S"));
    let mtime = now.timestamp().max(0) as u64;
    let mut tar = tar::Builder::new(Vec::new());
    append_json(&mut tar, &name, FLYNN_JSON, apps, mtime)?;
    append_json(&mut tar, &name, CONTROLLER_JSON, &state, mtime)?;
    let bytes = tar.into_inner()?;
    let sha512 = hex::encode(Sha512::digest(&bytes));
    let size = bytes.len() as i64;
    Ok(BackupArchive { name,
                       bytes,
                       sha512,
                       size })
}

/// Lee el estado y genera el archivo.
pub struct BackupWriter {
    formations: FormationRepo,
    events: PgEventStore,
}

impl BackupWriter {
    pub fn new(formations: FormationRepo, events: PgEventStore) -> Self { Self { formations, events } }

    pub async fn archive(&self) -> Result<BackupArchive> {
        // la marca primero: lo que se escriba después queda por encima
        let state = ControllerState { event_id_high_water_mark: self.events.high_water_mark().await? };
        let apps = apps_snapshot(self.formations.list_active().await?);
        let archive = write_archive(&apps, state, Utc::now())?;
        info!("backup:archived name={} apps={} size={} hwm={}",
              archive.name,
              apps.len(),
              archive.size,
              state.event_id_high_water_mark);
        Ok(archive)
    }
}

pub struct ClusterBackupHandler {
    writer: BackupWriter,
    backups: BackupRepo,
    blobstore: BlobstoreClient,
}

impl ClusterBackupHandler {
    pub fn new(writer: BackupWriter, backups: BackupRepo, blobstore: BlobstoreClient) -> Self {
        Self { writer,
               backups,
               blobstore }
    }

    async fn upload(&self, backup: &Backup) -> Result<BackupArchive> {
        let archive = self.writer.archive().await?;
        self.blobstore
            .put(&format!("backups/{}.tar", backup.id), archive.bytes.clone(), TAR_CONTENT_TYPE)
            .await?;
        Ok(archive)
    }
}

#[async_trait]
impl JobHandler for ClusterBackupHandler {
    async fn run(&self, job: &QueueJob) -> std::result::Result<(), JobError> {
        let args: ClusterBackupJobArgs = job.decode_args()?;
        let mut backup = self.backups.get(args.id).await.map_err(InfraError::from)?;
        if backup.status != BackupStatus::Running {
            info!("cluster_backup:skip id={} status={}", backup.id, backup.status);
            return Ok(());
        }
        match self.upload(&backup).await {
            Ok(archive) => {
                backup.status = BackupStatus::Complete;
                backup.sha512 = Some(archive.sha512);
                backup.size = Some(archive.size);
            }
            Err(e) => {
                error!("cluster_backup:failed id={} err={e}", backup.id);
                backup.status = BackupStatus::Error;
                backup.error = Some(e.to_string());
            }
        }
        self.backups.update(backup).await.map_err(InfraError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use chrono::TimeZone;
    use flotilla_domain::{App, Release};

    use super::*;

    fn formation(app: &App, release: Release) -> ExpandedFormation {
        ExpandedFormation { app: app.clone(),
                            release,
                            artifacts: Vec::new(),
                            processes: [("web".to_string(), 1)].into_iter().collect(),
                            tags: Default::default(),
                            pending_scale_request: None,
                            updated_at: None,
                            deleted: false }
    }

    #[test]
    fn snapshot_prefers_current_release() {
        let old = Release { id: uuid::Uuid::new_v4(),
                            ..Release::default() };
        let new = Release { id: uuid::Uuid::new_v4(),
                            ..Release::default() };
        let mut app = App::new("web");
        app.release_id = Some(new.id);
        let apps = apps_snapshot(vec![formation(&app, new.clone()), formation(&app, old.clone())]);
        assert_eq!(apps["web"].release.id, new.id);
        let apps = apps_snapshot(vec![formation(&app, old), formation(&app, new.clone())]);
        assert_eq!(apps["web"].release.id, new.id);
    }

    #[test]
    fn archive_contains_both_documents_and_digest() {
        let app = App::new("controller");
        let apps = apps_snapshot(vec![formation(&app, Release::default())]);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let archive = write_archive(&apps, ControllerState { event_id_high_water_mark: 42 }, now).unwrap();

        assert_eq!(archive.name, "flynn-backup-2024-05-01_123000");
        assert_eq!(archive.size, archive.bytes.len() as i64);
        assert_eq!(archive.sha512, hex::encode(Sha512::digest(&archive.bytes)));
        assert_eq!(archive.sha512.len(), 128);

        let mut files = BTreeMap::new();
        let mut reader = tar::Archive::new(archive.bytes.as_slice());
        for entry in reader.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            files.insert(path, body);
        }
        let flynn: serde_json::Value = serde_json::from_str(&files[&format!("{}/flynn.json", archive.name)]).unwrap();
        assert_eq!(flynn["controller"]["app"]["name"], "controller");
        let state: ControllerState = serde_json::from_str(&files[&format!("{}/controller.json", archive.name)]).unwrap();
        assert_eq!(state.event_id_high_water_mark, 42);
    }
}
