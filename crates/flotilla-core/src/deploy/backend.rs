//! Colaboradores del motor de despliegues.
//!
//! El motor no habla con Postgres ni con HTTP directamente: todo pasa por
//! estos tres traits, implementados en `flotilla-infra` sobre los
//! repositorios y los clientes de `flotilla-adapters`, y en los tests con
//! dobles en memoria.
use std::time::Duration;

use async_trait::async_trait;
use flotilla_domain::{DeploymentEvent, DeploymentStatus, Formation, Job, Labels, Release};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::CoreError;

pub const META_APP_ID: &str = "FLYNN_APP_ID";
pub const META_RELEASE_ID: &str = "FLYNN_RELEASE_ID";
pub const META_PROCESS_TYPE: &str = "FLYNN_PROCESS_TYPE";
pub const META_JOB_ID: &str = "FLYNN_JOB_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryEventKind {
    Current,
    Up,
    Down,
    Update,
    Leader,
    ServiceMeta,
}

/// Instancia registrada en service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instance {
    pub id: String,
    pub addr: String,
    pub meta: Labels,
}

impl Instance {
    pub fn meta_value(&self, key: &str) -> Option<&str> { self.meta.get(key).map(String::as_str) }

    pub fn release_id(&self) -> Option<Uuid> { self.meta_value(META_RELEASE_ID).and_then(|s| s.parse().ok()) }

    pub fn app_id(&self) -> Option<Uuid> { self.meta_value(META_APP_ID).and_then(|s| s.parse().ok()) }

    pub fn process_type(&self) -> Option<&str> { self.meta_value(META_PROCESS_TYPE) }

    pub fn job_id(&self) -> Option<&str> { self.meta_value(META_JOB_ID) }
}

/// Blob de metadata de un servicio, con el índice para escritura
/// condicional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMeta {
    pub data: serde_json::Value,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub service: String,
    pub kind: DiscoveryEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_meta: Option<ServiceMeta>,
}

impl DiscoveryEvent {
    pub fn current(service: &str) -> Self {
        Self { service: service.to_string(),
               kind: DiscoveryEventKind::Current,
               instance: None,
               service_meta: None }
    }

    pub fn instance(service: &str, kind: DiscoveryEventKind, instance: Instance) -> Self {
        Self { service: service.to_string(),
               kind,
               instance: Some(instance),
               service_meta: None }
    }

    pub fn meta(service: &str, meta: ServiceMeta) -> Self {
        Self { service: service.to_string(),
               kind: DiscoveryEventKind::ServiceMeta,
               instance: None,
               service_meta: Some(meta) }
    }
}

/// Roles de un cluster sirenia tal como se publican en la metadata del
/// servicio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SireniaState {
    pub singleton: bool,
    pub primary: Option<Instance>,
    pub sync: Option<Instance>,
    #[serde(rename = "async")]
    pub asyncs: Vec<Instance>,
}

/// Acceso al modelo del controller y al scheduler.
#[async_trait]
pub trait DeployBackend: Send + Sync {
    async fn host_count(&self) -> Result<usize, CoreError>;
    async fn get_release(&self, id: Uuid) -> Result<Release, CoreError>;
    async fn get_formation(&self, app_id: Uuid, release_id: Uuid) -> Result<Option<Formation>, CoreError>;
    async fn put_formation(&self, formation: &Formation) -> Result<(), CoreError>;
    async fn list_jobs(&self, app_id: Uuid) -> Result<Vec<Job>, CoreError>;
    /// Stream de eventos de job de la app. El cierre del canal se trata como
    /// fallo del stream.
    async fn subscribe_jobs(&self, app_id: Uuid) -> Result<mpsc::Receiver<Job>, CoreError>;
    async fn set_app_release(&self, app_id: Uuid, release_id: Uuid) -> Result<(), CoreError>;
    async fn record_event(&self, event: DeploymentEvent) -> Result<(), CoreError>;
    async fn finish(&self, deployment_id: Uuid, status: DeploymentStatus) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Abre un watcher: primero las instancias actuales (`Up`), luego
    /// `Current`, luego cambios en vivo.
    async fn watch(&self, service: &str) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError>;
    async fn get_meta(&self, service: &str) -> Result<Option<ServiceMeta>, CoreError>;
    async fn set_meta(&self, service: &str, meta: &ServiceMeta) -> Result<(), CoreError>;
}

/// Endpoint de gestión de un peer sirenia.
#[async_trait]
pub trait SireniaClient: Send + Sync {
    async fn stop(&self, addr: &str) -> Result<(), CoreError>;
    async fn wait_for_repl_sync(&self, upstream: &Instance, downstream: &Instance, timeout: Duration) -> Result<(), CoreError>;
    async fn wait_for_read_write(&self, addr: &str, timeout: Duration) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sirenia_state_decodes_async_list() {
        let raw = serde_json::json!({
            "singleton": false,
            "primary": {"id": "p", "addr": "10.0.0.1:5432"},
            "sync": {"id": "s", "addr": "10.0.0.2:5432"},
            "async": [{"id": "a1", "addr": "10.0.0.3:5432"}]
        });
        let st: SireniaState = serde_json::from_value(raw).unwrap();
        assert_eq!(st.asyncs.len(), 1);
        assert_eq!(st.primary.map(|p| p.id), Some("p".to_string()));
    }

    #[test]
    fn instance_meta_helpers() {
        let rel = Uuid::new_v4();
        let mut meta = Labels::new();
        meta.insert(META_RELEASE_ID.into(), rel.to_string());
        meta.insert(META_PROCESS_TYPE.into(), "web".into());
        let inst = Instance { id: "i".into(),
                              addr: "a".into(),
                              meta };
        assert_eq!(inst.release_id(), Some(rel));
        assert_eq!(inst.process_type(), Some("web"));
        assert_eq!(inst.app_id(), None);
    }
}
