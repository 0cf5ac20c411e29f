use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DeploymentStrategy, DomainError, JobState, Processes, Tags, DEFAULT_DEPLOY_TIMEOUT};

/// Mensaje exacto devuelto cuando ya hay un despliegue sin terminar.
pub const DEPLOY_IN_PROGRESS: &str = "Cannot create deploy, there is already one in progress for this app.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Complete => "complete",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, DeploymentStatus::Complete | DeploymentStatus::Failed | DeploymentStatus::Cancelled)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DeploymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentStatus::Pending),
            "running" => Ok(DeploymentStatus::Running),
            "complete" => Ok(DeploymentStatus::Complete),
            "failed" => Ok(DeploymentStatus::Failed),
            "cancelled" => Ok(DeploymentStatus::Cancelled),
            other => Err(DomainError::validation("status", format!("unknown deployment status: {other}"))),
        }
    }
}

/// Transición entre dos releases de una app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deployment {
    pub id: Uuid,
    pub app_id: Uuid,
    pub old_release_id: Option<Uuid>,
    pub new_release_id: Uuid,
    pub strategy: DeploymentStrategy,
    /// Contadores objetivo para el release nuevo.
    pub processes: Processes,
    pub tags: Tags,
    pub deploy_timeout: i32,
    pub status: DeploymentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for Deployment {
    fn default() -> Self {
        Self { id: Uuid::nil(),
               app_id: Uuid::nil(),
               old_release_id: None,
               new_release_id: Uuid::nil(),
               strategy: DeploymentStrategy::default(),
               processes: Processes::new(),
               tags: Tags::new(),
               deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
               status: DeploymentStatus::Pending,
               created_at: None,
               finished_at: None }
    }
}

impl Deployment {
    pub fn is_finished(&self) -> bool { self.finished_at.is_some() }
}

/// Evento de progreso de un despliegue, publicado en el event log con
/// `object_id = deployment_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentEvent {
    pub app_id: Uuid,
    pub deployment_id: Uuid,
    pub release_id: Uuid,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_state: Option<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentEvent {
    pub fn status(release_id: Uuid, status: DeploymentStatus) -> Self {
        Self { release_id,
               status,
               ..Self::default() }
    }

    pub fn job(release_id: Uuid, job_type: &str, job_state: JobState) -> Self {
        Self { release_id,
               status: DeploymentStatus::Running,
               job_type: Some(job_type.to_string()),
               job_state: Some(job_state),
               ..Self::default() }
    }

    pub fn failed(release_id: Uuid, error: impl Into<String>) -> Self {
        Self { release_id,
               status: DeploymentStatus::Failed,
               error: Some(error.into()),
               ..Self::default() }
    }
}
