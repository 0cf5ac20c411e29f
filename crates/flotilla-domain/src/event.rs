//! Evento del log append-only.
//!
//! Cada mutación de un repositorio escribe exactamente un evento dentro de la
//! misma transacción. El id es monotónico (una sola secuencia) y los eventos
//! nunca se modifican ni se borran.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    App,
    AppDeletion,
    AppRelease,
    Artifact,
    Release,
    ReleaseDeletion,
    Formation,
    FormationDeletion,
    ScaleRequest,
    ScaleRequestCancelation,
    Deployment,
    Job,
    Provider,
    Resource,
    ResourceDeletion,
    Key,
    KeyDeletion,
    Route,
    RouteDeletion,
    Sink,
    SinkDeletion,
    Volume,
    DomainMigration,
    ClusterBackup,
}

impl EventType {
    pub const ALL: [EventType; 24] = [EventType::App,
                                      EventType::AppDeletion,
                                      EventType::AppRelease,
                                      EventType::Artifact,
                                      EventType::Release,
                                      EventType::ReleaseDeletion,
                                      EventType::Formation,
                                      EventType::FormationDeletion,
                                      EventType::ScaleRequest,
                                      EventType::ScaleRequestCancelation,
                                      EventType::Deployment,
                                      EventType::Job,
                                      EventType::Provider,
                                      EventType::Resource,
                                      EventType::ResourceDeletion,
                                      EventType::Key,
                                      EventType::KeyDeletion,
                                      EventType::Route,
                                      EventType::RouteDeletion,
                                      EventType::Sink,
                                      EventType::SinkDeletion,
                                      EventType::Volume,
                                      EventType::DomainMigration,
                                      EventType::ClusterBackup];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::App => "app",
            EventType::AppDeletion => "app_deletion",
            EventType::AppRelease => "app_release",
            EventType::Artifact => "artifact",
            EventType::Release => "release",
            EventType::ReleaseDeletion => "release_deletion",
            EventType::Formation => "formation",
            EventType::FormationDeletion => "formation_deletion",
            EventType::ScaleRequest => "scale_request",
            EventType::ScaleRequestCancelation => "scale_request_cancelation",
            EventType::Deployment => "deployment",
            EventType::Job => "job",
            EventType::Provider => "provider",
            EventType::Resource => "resource",
            EventType::ResourceDeletion => "resource_deletion",
            EventType::Key => "key",
            EventType::KeyDeletion => "key_deletion",
            EventType::Route => "route",
            EventType::RouteDeletion => "route_deletion",
            EventType::Sink => "sink",
            EventType::SinkDeletion => "sink_deletion",
            EventType::Volume => "volume",
            EventType::DomainMigration => "domain_migration",
            EventType::ClusterBackup => "cluster_backup",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL.iter()
                      .copied()
                      .find(|t| t.as_str() == s)
                      .ok_or_else(|| DomainError::validation("object_type", format!("unknown event type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOp {
    #[default]
    Create,
    Update,
}

impl EventOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOp::Create => "create",
            EventOp::Update => "update",
        }
    }
}

impl FromStr for EventOp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventOp::Create),
            "update" => Ok(EventOp::Update),
            other => Err(DomainError::validation("op", format!("unknown event op: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<Uuid>,
    pub object_id: String,
    pub object_type: EventType,
    pub op: EventOp,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Decodifica `data` como el tipo de objeto esperado.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, DomainError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_roundtrip_through_from_str() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), serde_json::json!(t.as_str()));
        }
    }

    #[test]
    fn payload_shape() {
        let ev = Event { id: 7,
                         app_id: None,
                         object_id: "x".into(),
                         object_type: EventType::Key,
                         op: EventOp::Create,
                         data: serde_json::json!({}),
                         created_at: Utc::now() };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["op"], "create");
        assert_eq!(v["object_type"], "key");
        assert!(v.get("app_id").is_none());
    }
}
