use std::ops::Deref;
use std::sync::Arc;

use flotilla_adapters::{ClusterClient, RouterClient};
use flotilla_infra::{BackupWriter, InfraContext};
use flotilla_persistence::{AppRepo, ArtifactRepo, BackupRepo, Db, DeploymentRepo, DomainMigrationRepo, FormationRepo, JobRepo,
                           KeyRepo, PgEventListener, PgEventStore, ProviderRepo, ReleaseRepo, ResourceRepo, ScaleRequestRepo,
                           SinkRepo, VolumeRepo};

use crate::auth::AuthKeys;

/// Parámetros de la superficie HTTP/gRPC.
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    pub auth_keys: AuthKeys,
    pub ca_cert: Option<String>,
    pub audit_log: bool,
}

pub struct Controller {
    pub db: Arc<Db>,
    pub apps: AppRepo,
    pub artifacts: ArtifactRepo,
    pub releases: ReleaseRepo,
    pub formations: FormationRepo,
    pub scales: ScaleRequestRepo,
    pub deployments: DeploymentRepo,
    pub jobs: JobRepo,
    pub keys: KeyRepo,
    pub providers: ProviderRepo,
    pub resources: ResourceRepo,
    pub sinks: SinkRepo,
    pub volumes: VolumeRepo,
    pub backups: BackupRepo,
    pub domain_migrations: DomainMigrationRepo,
    pub events: PgEventStore,
    pub listener: Arc<PgEventListener>,
    pub router: RouterClient,
    pub cluster: ClusterClient,
    pub backup_writer: BackupWriter,
    pub config: ApiConfig,
}

/// Estado compartido por handlers HTTP y el servicio gRPC.
#[derive(Clone)]
pub struct ApiState(Arc<Controller>);

impl ApiState {
    pub fn new(infra: &InfraContext, config: ApiConfig) -> Self {
        let db = infra.db.clone();
        Self(Arc::new(Controller { apps: AppRepo::new(db.clone(), infra.names.clone()),
                                   artifacts: ArtifactRepo::new(db.clone()),
                                   releases: ReleaseRepo::new(db.clone()),
                                   formations: FormationRepo::new(db.clone()),
                                   scales: ScaleRequestRepo::new(db.clone()),
                                   deployments: DeploymentRepo::new(db.clone()),
                                   jobs: JobRepo::new(db.clone()),
                                   keys: KeyRepo::new(db.clone()),
                                   providers: ProviderRepo::new(db.clone()),
                                   resources: ResourceRepo::new(db.clone()),
                                   sinks: SinkRepo::new(db.clone()),
                                   volumes: VolumeRepo::new(db.clone()),
                                   backups: BackupRepo::new(db.clone()),
                                   domain_migrations: DomainMigrationRepo::new(db.clone(), &infra.default_domain),
                                   events: PgEventStore::new(db.clone()),
                                   listener: infra.listener.clone(),
                                   router: infra.router.clone(),
                                   cluster: infra.cluster.clone(),
                                   backup_writer: infra.backup_writer(),
                                   config,
                                   db }))
    }
}

impl Deref for ApiState {
    type Target = Controller;

    fn deref(&self) -> &Controller { &self.0 }
}
