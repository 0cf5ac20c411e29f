//! `DeployBackend` sobre los repositorios de Postgres y el cluster.
//!
//! Las transiciones de jobs llegan por el listener de eventos (`job`); el
//! número de hosts se consulta al cluster en cada llamada.

use std::sync::Arc;

use async_trait::async_trait;
use flotilla_adapters::ClusterClient;
use flotilla_core::{CoreError, DeployBackend, EventFilter, EventSource};
use flotilla_domain::{DeploymentEvent, DeploymentStatus, EventType, Formation, Job, NameGenerator, Release};
use flotilla_persistence::{AppRepo, Db, DeploymentRepo, FormationRepo, JobRepo, ReleaseRepo};
use log::{debug, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

const JOB_BUFFER: usize = 256;

pub struct PgDeployBackend {
    apps: AppRepo,
    releases: ReleaseRepo,
    formations: FormationRepo,
    jobs: JobRepo,
    deployments: DeploymentRepo,
    events: Arc<dyn EventSource>,
    cluster: ClusterClient,
}

impl PgDeployBackend {
    pub fn new(db: Arc<Db>, names: Arc<NameGenerator>, events: Arc<dyn EventSource>, cluster: ClusterClient) -> Self {
        Self { apps: AppRepo::new(db.clone(), names),
               releases: ReleaseRepo::new(db.clone()),
               formations: FormationRepo::new(db.clone()),
               jobs: JobRepo::new(db.clone()),
               deployments: DeploymentRepo::new(db),
               events,
               cluster }
    }
}

#[async_trait]
impl DeployBackend for PgDeployBackend {
    async fn host_count(&self) -> Result<usize, CoreError> { Ok(self.cluster.hosts().await?.len()) }

    async fn get_release(&self, id: Uuid) -> Result<Release, CoreError> { Ok(self.releases.get(id).await?) }

    async fn get_formation(&self, app_id: Uuid, release_id: Uuid) -> Result<Option<Formation>, CoreError> {
        match self.formations.get(app_id, release_id).await.map_err(CoreError::from) {
            Ok(f) => Ok(Some(f)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_formation(&self, formation: &Formation) -> Result<(), CoreError> {
        self.formations.put(formation.clone()).await?;
        Ok(())
    }

    async fn list_jobs(&self, app_id: Uuid) -> Result<Vec<Job>, CoreError> { Ok(self.jobs.list(app_id).await?) }

    async fn subscribe_jobs(&self, app_id: Uuid) -> Result<mpsc::Receiver<Job>, CoreError> {
        let mut sub = self.events.subscribe(EventFilter::app(app_id).with_types(&[EventType::Job])).await?;
        let (tx, rx) = mpsc::channel(JOB_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = sub.next().await {
                match serde_json::from_value::<Job>(event.data) {
                    Ok(job) => {
                        if tx.send(job).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("deploy_backend:bad_job_event event_id={} err={e}", event.id),
                }
            }
            debug!("deploy_backend:job_stream_closed app_id={app_id}");
        });
        Ok(rx)
    }

    async fn set_app_release(&self, app_id: Uuid, release_id: Uuid) -> Result<(), CoreError> {
        self.apps.set_release(app_id, release_id).await?;
        Ok(())
    }

    async fn record_event(&self, event: DeploymentEvent) -> Result<(), CoreError> {
        Ok(self.deployments.record_event(&event).await?)
    }

    async fn finish(&self, deployment_id: Uuid, status: DeploymentStatus) -> Result<(), CoreError> {
        Ok(self.deployments.finish(deployment_id, status).await?)
    }
}
