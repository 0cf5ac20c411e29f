//! Worker de la clase `deployment`: ejecuta un despliegue encolado.
//!
//! Un despliegue terminado (por otro worker o por un reintento) se da por
//! hecho. La cancelación llega como un `DeploymentEvent` con estado
//! `cancelled`; se observa desde el historial y en vivo, así que una
//! cancelación anterior al arranque del worker también corta.

use std::sync::Arc;

use async_trait::async_trait;
use flotilla_core::{subscribe_with_history, CoreError, Deployer, EventFilter, EventSource, EventStore, JobError, JobHandler,
                    QueueJob};
use flotilla_domain::{Deployment, DeploymentEvent, DeploymentStatus, Event, EventType};
use flotilla_persistence::{DeploymentJobArgs, DeploymentRepo};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::InfraError;

fn is_cancellation(event: &Event) -> bool {
    serde_json::from_value::<DeploymentEvent>(event.data.clone()).is_ok_and(|e| e.status == DeploymentStatus::Cancelled)
}

/// Cancela `cancel` en cuanto aparezca un evento `cancelled` del despliegue.
pub async fn watch_cancellation(store: &dyn EventStore,
                                source: &dyn EventSource,
                                deployment: &Deployment,
                                cancel: CancellationToken)
                                -> Result<JoinHandle<()>, CoreError> {
    let filter = EventFilter::app(deployment.app_id).with_types(&[EventType::Deployment])
                                                    .with_object_id(deployment.id.to_string());
    let (history, mut sub) = subscribe_with_history(store, source, filter, None, None).await?;
    let id = deployment.id;
    if history.iter().any(is_cancellation) {
        info!("deployment_worker:cancelled_before_start id={id}");
        cancel.cancel();
    }
    Ok(tokio::spawn(async move {
        while let Some(event) = sub.next().await {
            if is_cancellation(&event) {
                info!("deployment_worker:cancel_requested id={id}");
                cancel.cancel();
                return;
            }
        }
    }))
}

pub struct DeploymentHandler {
    deployments: DeploymentRepo,
    store: Arc<dyn EventStore>,
    source: Arc<dyn EventSource>,
    deployer: Deployer,
}

impl DeploymentHandler {
    pub fn new(deployments: DeploymentRepo, store: Arc<dyn EventStore>, source: Arc<dyn EventSource>, deployer: Deployer) -> Self {
        Self { deployments,
               store,
               source,
               deployer }
    }
}

#[async_trait]
impl JobHandler for DeploymentHandler {
    async fn run(&self, job: &QueueJob) -> Result<(), JobError> {
        let args: DeploymentJobArgs = job.decode_args()?;
        let deployment = self.deployments.get(args.id).await.map_err(InfraError::from)?;
        if deployment.is_finished() {
            info!("deployment_worker:skip id={} status={}", deployment.id, deployment.status);
            return Ok(());
        }
        let cancel = CancellationToken::new();
        let watcher = watch_cancellation(self.store.as_ref(), self.source.as_ref(), &deployment, cancel.clone()).await
                                                                                                                .map_err(InfraError::from)?;
        let result = self.deployer.deploy(deployment, cancel).await;
        watcher.abort();
        match result {
            Ok(status) => {
                info!("deployment_worker:done id={} status={status}", args.id);
                Ok(())
            }
            Err(e) => {
                warn!("deployment_worker:error id={} err={e}", args.id);
                Err(InfraError::from(e).into())
            }
        }
    }
}
