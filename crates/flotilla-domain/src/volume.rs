use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Labels;

/// Reclamación de almacenamiento persistente creada por un host agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub id: Uuid,
    pub host_id: String,
    pub app_id: Option<Uuid>,
    pub release_id: Option<Uuid>,
    pub job_id: Option<String>,
    pub job_type: Option<String>,
    pub state: String,
    #[serde(rename = "type")]
    pub volume_type: String,
    pub path: Option<String>,
    pub delete_on_stop: bool,
    pub meta: Labels,
    pub decommissioned: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub decommissioned_at: Option<DateTime<Utc>>,
}
