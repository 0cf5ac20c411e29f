use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Processes, Tags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleRequestState {
    #[default]
    Pending,
    Cancelled,
    Complete,
}

impl ScaleRequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleRequestState::Pending => "pending",
            ScaleRequestState::Cancelled => "cancelled",
            ScaleRequestState::Complete => "complete",
        }
    }
}

impl fmt::Display for ScaleRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ScaleRequestState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScaleRequestState::Pending),
            "cancelled" => Ok(ScaleRequestState::Cancelled),
            "complete" => Ok(ScaleRequestState::Complete),
            other => Err(DomainError::validation("state", format!("unknown scale request state: {other}"))),
        }
    }
}

/// Intención pendiente de mover una formación a nuevos contadores/tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleRequest {
    pub id: Uuid,
    pub app_id: Uuid,
    pub release_id: Uuid,
    pub state: ScaleRequestState,
    pub old_processes: Processes,
    pub new_processes: Option<Processes>,
    pub old_tags: Tags,
    pub new_tags: Option<Tags>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScaleRequest {
    /// Clave de idempotencia del evento: `(id, state)`.
    pub fn event_unique_id(&self) -> String { format!("{}|{}", self.id, self.state) }

    pub fn is_finished(&self) -> bool { self.state != ScaleRequestState::Pending }
}
