use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// Cambio del dominio por defecto del cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainMigration {
    pub id: Uuid,
    pub old_domain: String,
    pub domain: String,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DomainMigration {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.domain.is_empty() {
            return Err(DomainError::validation("domain", "must not be empty"));
        }
        if self.domain == self.old_domain {
            return Err(DomainError::validation("domain", "must differ from the current domain"));
        }
        if self.domain.contains('/') || self.domain.contains(' ') {
            return Err(DomainError::validation("domain", "is not a valid domain name"));
        }
        Ok(())
    }

    /// Reescribe un dominio de ruta `<x>.<old_domain>` a `<x>.<domain>`.
    /// Devuelve `None` si la ruta no pertenece al dominio viejo.
    pub fn migrate_route_domain(&self, route_domain: &str) -> Option<String> {
        let suffix = format!(".{}", self.old_domain);
        route_domain.strip_suffix(&suffix).map(|prefix| format!("{prefix}.{}", self.domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_only_default_domain_routes() {
        let dm = DomainMigration { old_domain: "old.example.com".into(),
                                   domain: "new.example.com".into(),
                                   ..DomainMigration::default() };
        assert_eq!(dm.migrate_route_domain("web.old.example.com").as_deref(), Some("web.new.example.com"));
        assert_eq!(dm.migrate_route_domain("web.other.com"), None);
    }
}
