use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// Destino de reenvío de logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sink {
    pub id: Uuid,
    pub kind: String,
    pub config: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Sink {
    pub fn validate(&self) -> Result<(), DomainError> {
        match self.kind.as_str() {
            "syslog" => {
                let url = self.config.get("url").and_then(|v| v.as_str()).unwrap_or("");
                if url.is_empty() {
                    return Err(DomainError::validation("config", "syslog sinks require a url"));
                }
                Ok(())
            }
            "" => Err(DomainError::validation("kind", "must not be empty")),
            other => Err(DomainError::validation("kind", format!("unknown sink kind: {other}"))),
        }
    }
}
