//! Motor de despliegues.
//!
//! Un `Deployer` toma un registro de despliegue, prepara un `DeployJob`
//! (releases, formations, streams de eventos), ejecuta la estrategia y
//! cierra el despliegue con su estado final. No hay rollback automático:
//! ante un fallo se publica un evento `failed` y el despliegue se da por
//! terminado tal como quedó.
mod all_at_once;
pub mod backend;
mod discoverd_meta;
pub mod job;
mod one_by_one;
mod sirenia;

use flotilla_domain::{Deployment, DeploymentEvent, DeploymentStatus, DeploymentStrategy};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

pub use backend::{DeployBackend, DiscoveryEvent, DiscoveryEventKind, Instance, ServiceDiscovery, ServiceMeta, SireniaClient,
                  SireniaState, META_APP_ID, META_JOB_ID, META_PROCESS_TYPE, META_RELEASE_ID};
pub use job::{DeployContext, DeployJob, JobEvents};
pub use sirenia::SIRENIA_PROCESS_ENV;

use crate::errors::CoreError;

#[derive(Clone)]
pub struct Deployer {
    ctx: DeployContext,
}

impl Deployer {
    pub fn new(ctx: DeployContext) -> Self { Self { ctx } }

    /// Ejecuta el despliegue hasta su estado final y lo devuelve.
    ///
    /// `cancel` corta cualquier espera en curso; el despliegue queda
    /// `cancelled` sin evento adicional (el evento lo publica quien cancela).
    pub async fn deploy(&self, deployment: Deployment, cancel: CancellationToken) -> Result<DeploymentStatus, CoreError> {
        if deployment.is_finished() {
            info!("deployment {} already finished ({}), skipping", deployment.id, deployment.status);
            return Ok(deployment.status);
        }
        info!("deployment {}: app={} strategy={} old={:?} new={}",
              deployment.id, deployment.app_id, deployment.strategy, deployment.old_release_id, deployment.new_release_id);
        self.emit(&deployment, DeploymentEvent::status(deployment.new_release_id, DeploymentStatus::Running))
            .await;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            res = self.perform(deployment.clone(), cancel.clone()) => res,
        };
        let result = match result {
            Ok(()) => {
                info!("deployment {}: setting app release", deployment.id);
                self.ctx.backend.set_app_release(deployment.app_id, deployment.new_release_id).await
            }
            Err(e) => Err(e),
        };

        let status = match result {
            Ok(()) => {
                self.emit(&deployment, DeploymentEvent::status(deployment.new_release_id, DeploymentStatus::Complete))
                    .await;
                info!("deployment {} complete", deployment.id);
                DeploymentStatus::Complete
            }
            Err(CoreError::Cancelled) => {
                warn!("deployment {} cancelled", deployment.id);
                DeploymentStatus::Cancelled
            }
            Err(e) => {
                error!("deployment {} failed: {e}", deployment.id);
                self.emit(&deployment, DeploymentEvent::failed(deployment.new_release_id, e.to_string())).await;
                DeploymentStatus::Failed
            }
        };
        self.ctx.backend.finish(deployment.id, status).await?;
        Ok(status)
    }

    async fn perform(&self, deployment: Deployment, cancel: CancellationToken) -> Result<(), CoreError> {
        let strategy = deployment.strategy;
        let mut job = DeployJob::prepare(deployment, self.ctx.clone(), cancel).await?;
        match strategy {
            DeploymentStrategy::AllAtOnce => job.deploy_all_at_once().await,
            DeploymentStrategy::OneByOne => job.deploy_one_by_one().await,
            DeploymentStrategy::Sirenia => job.deploy_sirenia().await,
            DeploymentStrategy::DiscoverdMeta => job.deploy_discoverd_meta().await,
        }
    }

    async fn emit(&self, deployment: &Deployment, mut event: DeploymentEvent) {
        event.app_id = deployment.app_id;
        event.deployment_id = deployment.id;
        if let Err(e) = self.ctx.backend.record_event(event).await {
            warn!("deployment {}: error recording deployment event: {e}", deployment.id);
        }
    }
}
