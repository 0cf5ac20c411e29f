//! flotilla-infra: une core, persistencia y adaptadores.
//!
//! - `backend`: `DeployBackend` sobre Postgres y el cluster.
//! - `deployer`: worker `deployment`.
//! - `domain_migration`: worker `domain_migration`.
//! - `backup`: tar del estado y worker `cluster_backup`.
//!
//! `handler_registry` arma el registro con los tres workers.

pub mod backend;
pub mod backup;
pub mod deployer;
pub mod domain_migration;
pub mod error;

use std::sync::Arc;

use flotilla_adapters::{BlobstoreClient, ClusterClient, DiscoverdClient, RouterClient, SireniaHttpClient};
use flotilla_core::{DeployContext, Deployer, HandlerRegistry};
use flotilla_domain::NameGenerator;
use flotilla_persistence::{BackupRepo, Db, DeploymentRepo, DomainMigrationRepo, FormationRepo, PgEventListener, PgEventStore,
                           CLUSTER_BACKUP_JOB_CLASS, DEPLOYMENT_JOB_CLASS, DOMAIN_MIGRATION_JOB_CLASS};

pub use backend::PgDeployBackend;
pub use backup::{BackupArchive, BackupWriter, ClusterBackupHandler};
pub use deployer::DeploymentHandler;
pub use domain_migration::DomainMigrationHandler;
pub use error::InfraError;

/// Colaboradores que necesitan los workers.
#[derive(Clone)]
pub struct InfraContext {
    pub db: Arc<Db>,
    pub names: Arc<NameGenerator>,
    pub listener: Arc<PgEventListener>,
    pub cluster: ClusterClient,
    pub discoverd: DiscoverdClient,
    pub router: RouterClient,
    pub blobstore: BlobstoreClient,
    pub default_domain: String,
}

impl InfraContext {
    pub fn deploy_context(&self) -> DeployContext {
        let backend = PgDeployBackend::new(self.db.clone(), self.names.clone(), self.listener.clone(), self.cluster.clone());
        DeployContext { backend: Arc::new(backend),
                        discovery: Arc::new(self.discoverd.clone()),
                        sirenia: Arc::new(SireniaHttpClient::new()) }
    }

    pub fn backup_writer(&self) -> BackupWriter {
        BackupWriter::new(FormationRepo::new(self.db.clone()), PgEventStore::new(self.db.clone()))
    }
}

/// Registro con los workers `deployment`, `domain_migration` y
/// `cluster_backup`.
pub fn handler_registry(ctx: &InfraContext) -> HandlerRegistry {
    let deployments = DeploymentHandler::new(DeploymentRepo::new(ctx.db.clone()),
                                             Arc::new(PgEventStore::new(ctx.db.clone())),
                                             ctx.listener.clone(),
                                             Deployer::new(ctx.deploy_context()));
    let migrations = DomainMigrationHandler::new(DomainMigrationRepo::new(ctx.db.clone(), &ctx.default_domain), ctx.router.clone());
    let backups = ClusterBackupHandler::new(ctx.backup_writer(), BackupRepo::new(ctx.db.clone()), ctx.blobstore.clone());
    HandlerRegistry::new().register(DEPLOYMENT_JOB_CLASS, Arc::new(deployments))
                          .register(DOMAIN_MIGRATION_JOB_CLASS, Arc::new(migrations))
                          .register(CLUSTER_BACKUP_JOB_CLASS, Arc::new(backups))
}
