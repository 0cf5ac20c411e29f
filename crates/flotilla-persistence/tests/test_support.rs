#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use flotilla_domain::{App, Artifact, ArtifactType, NameGenerator, ProcessType, Release};
use flotilla_persistence::{AppRepo, ArtifactRepo, Db, DbConfig, ReleaseRepo};
use uuid::Uuid;

/// Base de datos de test, o `None` (y el test se salta) sin `DATABASE_URL`.
pub async fn test_db() -> Option<Arc<Db>> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return None;
    }
    let mut cfg = match DbConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("skip (config: {e})");
            return None;
        }
    };
    cfg.min_connections = 1;
    cfg.max_connections = 4;
    match Db::connect(cfg).await {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!("No se pudo abrir la base de test: {e}");
            None
        }
    }
}

pub fn unique_name(prefix: &str) -> String { format!("{prefix}-{}", Uuid::new_v4().simple()) }

pub fn app_repo(db: &Arc<Db>) -> AppRepo { AppRepo::new(db.clone(), Arc::new(NameGenerator::from_entropy())) }

pub async fn create_app(db: &Arc<Db>) -> App {
    app_repo(db).add(App::new(&unique_name("test"))).await.expect("app")
}

/// Release con un artifact de imagen nuevo y los tipos de proceso dados.
pub async fn create_release(db: &Arc<Db>, app: &App, types: &[&str]) -> Release {
    let artifact = ArtifactRepo::new(db.clone()).add(Artifact::new(ArtifactType::Docker,
                                                                   &format!("https://registry.test/{}", Uuid::new_v4())))
                                                .await
                                                .expect("artifact");
    let processes: BTreeMap<String, ProcessType> = types.iter().map(|t| (t.to_string(), ProcessType::default())).collect();
    let release = Release { app_id: Some(app.id),
                            artifacts: vec![artifact.id],
                            processes,
                            ..Release::default() };
    ReleaseRepo::new(db.clone()).add(release).await.expect("release")
}
