//! Job: proceso reportado por scheduler / host agent.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Labels};

/// Estados de un job. El orden es `pending < starting < up < stopping <
/// {down, crashed, failed}`; los tres últimos son terminales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Pending,
    Starting,
    Up,
    Stopping,
    Down,
    Crashed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Starting => "starting",
            JobState::Up => "up",
            JobState::Stopping => "stopping",
            JobState::Down => "down",
            JobState::Crashed => "crashed",
            JobState::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Starting => 1,
            JobState::Up => 2,
            JobState::Stopping => 3,
            JobState::Down | JobState::Crashed | JobState::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool { self.rank() == 4 }

    /// Sólo se permiten transiciones hacia adelante. Repetir el mismo estado
    /// es válido (reporte idempotente); saltar entre terminales no.
    pub fn can_transition_to(&self, next: JobState) -> bool { *self == next || next.rank() > self.rank() }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "starting" => Ok(JobState::Starting),
            "up" => Ok(JobState::Up),
            "stopping" => Ok(JobState::Stopping),
            "down" => Ok(JobState::Down),
            "crashed" => Ok(JobState::Crashed),
            "failed" => Ok(JobState::Failed),
            other => Err(DomainError::validation("state", format!("unknown job state: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Identificador global del job (uuid).
    pub uuid: Uuid,
    /// Identificador con prefijo de host (`<host_id>-<uuid>`).
    pub id: String,
    pub host_id: String,
    pub app_id: Uuid,
    pub release_id: Uuid,
    #[serde(rename = "type")]
    pub process_type: String,
    pub state: JobState,
    pub args: Vec<String>,
    pub meta: Labels,
    pub exit_status: Option<i32>,
    pub host_error: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
    pub restarts: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Clave de idempotencia del evento: `(uuid, state)`.
    pub fn event_unique_id(&self) -> String { format!("{}|{}", self.uuid, self.state) }

    pub fn is_down(&self) -> bool { self.state.is_terminal() }

    /// Construye el id de cluster `<host>-<uuid>`.
    pub fn cluster_id(host_id: &str, uuid: Uuid) -> String { format!("{host_id}-{uuid}") }

    /// Separa `host_id` y `uuid` de un id de cluster.
    pub fn split_cluster_id(id: &str) -> Option<(&str, Uuid)> {
        // El uuid ocupa los últimos 36 caracteres.
        let idx = id.len().checked_sub(37)?;
        let host = id.get(..idx).filter(|h| !h.is_empty())?;
        let uuid = id.get(idx..)?.strip_prefix('-')?;
        Some((host, Uuid::parse_str(uuid).ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_only_transitions() {
        use JobState::*;
        assert!(Pending.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Up));
        assert!(Up.can_transition_to(Down));
        assert!(Up.can_transition_to(Up));
        assert!(!Up.can_transition_to(Starting));
        assert!(!Stopping.can_transition_to(Up));
        assert!(!Down.can_transition_to(Crashed));
        assert!(Pending.can_transition_to(Failed));
    }

    #[test]
    fn cluster_id_roundtrip() {
        let uuid = Uuid::new_v4();
        let id = Job::cluster_id("host-1", uuid);
        assert_eq!(Job::split_cluster_id(&id), Some(("host-1", uuid)));
        assert_eq!(Job::split_cluster_id("nope"), None);
    }
}
