use std::collections::BTreeMap;

use log::{info, warn};

use super::backend::ServiceMeta;
use super::job::DeployJob;
use crate::constants::META_CAPTURE_TIMEOUT;
use crate::errors::CoreError;

impl DeployJob {
    /// all-at-once con la metadata de servicio preservada: se captura antes
    /// de escalar y se vuelve a escribir al terminar.
    pub(super) async fn deploy_discoverd_meta(&mut self) -> Result<(), CoreError> {
        info!("deployment {}: starting discoverd-meta deployment", self.deployment.id);

        let services: Vec<String> = self.service_names.values().cloned().collect();
        let mut captured: BTreeMap<String, ServiceMeta> = BTreeMap::new();
        for service in services {
            let meta = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CoreError::Cancelled),
                res = tokio::time::timeout(META_CAPTURE_TIMEOUT, self.ctx.discovery.get_meta(&service)) => {
                    res.map_err(|_| CoreError::Timeout(format!("capturing service metadata for {service}")))??
                }
            };
            match meta {
                Some(meta) => {
                    captured.insert(service, meta);
                }
                None => warn!("deployment {}: service {service} has no metadata", self.deployment.id),
            }
        }

        self.deploy_all_at_once().await?;

        for (service, meta) in captured {
            info!("deployment {}: restoring metadata of {service}", self.deployment.id);
            self.ctx.discovery.set_meta(&service, &meta).await?;
        }
        Ok(())
    }
}
