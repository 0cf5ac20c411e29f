//! Release: snapshot inmutable de artifacts + entorno + tipos de proceso.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Labels};

/// Clasificación del release según su origen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseType {
    /// Release que cambia código (build desde git).
    Code,
    /// Release que sólo cambia configuración.
    Config,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "type", default)]
    pub check_type: String,
    #[serde(default)]
    pub interval_ms: Option<i64>,
    #[serde(default)]
    pub threshold: Option<i32>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortService {
    pub name: String,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub check: Option<HealthCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub proto: String,
    #[serde(default)]
    pub service: Option<PortService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeReq {
    pub path: String,
    #[serde(default)]
    pub delete_on_stop: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub request: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub location: String,
    pub target: String,
    #[serde(default)]
    pub writeable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedDevice {
    pub path: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub major: Option<i64>,
    #[serde(default)]
    pub minor: Option<i64>,
    #[serde(default)]
    pub permissions: String,
}

/// Definición de un tipo de proceso dentro de un release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessType {
    pub args: Vec<String>,
    pub env: Labels,
    pub ports: Vec<Port>,
    pub volumes: Vec<VolumeReq>,
    pub resources: BTreeMap<String, ResourceSpec>,
    pub mounts: Vec<Mount>,
    pub allowed_devices: Vec<AllowedDevice>,
    pub linux_capabilities: Vec<String>,
    /// Nombre del servicio en discovery; vacío si el proceso no se registra.
    pub service: Option<String>,
    pub omni: bool,
    pub host_network: bool,
    pub host_pid_namespace: bool,
    pub resurrect: bool,
    pub writeable_cgroups: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    pub id: Uuid,
    pub app_id: Option<Uuid>,
    /// Orden significativo: índice 0 es la imagen, el resto capas de fichero.
    pub artifacts: Vec<Uuid>,
    pub env: Labels,
    pub meta: Labels,
    pub processes: BTreeMap<String, ProcessType>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Release {
    pub fn image_artifact_id(&self) -> Option<Uuid> { self.artifacts.first().copied() }

    pub fn file_artifact_ids(&self) -> &[Uuid] {
        if self.artifacts.is_empty() {
            &[]
        } else {
            &self.artifacts[1..]
        }
    }

    pub fn release_type(&self) -> ReleaseType {
        if self.meta.get("git").map(|v| v == "true").unwrap_or(false) {
            ReleaseType::Code
        } else {
            ReleaseType::Config
        }
    }

    pub fn has_process(&self, typ: &str) -> bool { self.processes.contains_key(typ) }

    /// Tipos de proceso que anuncian un servicio en discovery.
    pub fn service_names(&self) -> BTreeMap<&str, &str> {
        self.processes
            .iter()
            .filter_map(|(typ, proc)| proc.service.as_deref().filter(|s| !s.is_empty()).map(|s| (typ.as_str(), s)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        for (typ, proc) in &self.processes {
            if typ.is_empty() {
                return Err(DomainError::validation("processes", "process type names must not be empty"));
            }
            for port in &proc.ports {
                if !(0..=65535).contains(&port.port) {
                    return Err(DomainError::validation("processes", format!("{typ}: invalid port {}", port.port)));
                }
            }
            for vol in &proc.volumes {
                if !vol.path.starts_with('/') {
                    return Err(DomainError::validation("processes", format!("{typ}: volume path must be absolute")));
                }
            }
        }
        Ok(())
    }
}
