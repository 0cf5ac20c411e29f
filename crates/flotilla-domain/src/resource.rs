use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Labels};

/// Endpoint HTTP con nombre que aprovisiona recursos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Provider {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::validation("name", "must not be empty"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(DomainError::validation("url", "must be an http(s) URL"));
        }
        Ok(())
    }
}

/// Recurso externo ligado a un conjunto de apps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub external_id: String,
    /// Variables inyectadas en los releases de las apps consumidoras.
    pub env: Labels,
    pub apps: Vec<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.external_id.is_empty() {
            return Err(DomainError::validation("external_id", "must not be empty"));
        }
        Ok(())
    }
}
