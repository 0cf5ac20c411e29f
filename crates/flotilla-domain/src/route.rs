//! Ruta de ingreso. El router es el sistema de registro; el controlador sólo
//! fija el `parent_ref` y hace de proxy del CRUD.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default)]
    pub id: Option<String>,
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    #[serde(rename = "type")]
    pub route_type: String,
    pub id: String,
    pub parent_ref: String,
    pub service: String,
    pub leader: bool,
    pub drain_backends: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    pub sticky: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Route {
    /// `apps/<app-id>`.
    pub fn app_parent_ref(app_id: Uuid) -> String { format!("apps/{app_id}") }

    pub fn belongs_to(&self, app_id: Uuid) -> bool { self.parent_ref == Self::app_parent_ref(app_id) }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self.route_type.as_str() {
            "http" => {
                if self.domain.as_deref().unwrap_or("").is_empty() {
                    return Err(DomainError::validation("domain", "must be set for http routes"));
                }
            }
            "tcp" => {}
            other => return Err(DomainError::validation("type", format!("unknown route type: {other}"))),
        }
        if self.service.is_empty() {
            return Err(DomainError::validation("service", "must not be empty"));
        }
        Ok(())
    }

    /// Copia sin la clave privada TLS, para logs de auditoría.
    pub fn redacted(&self) -> Route {
        let mut r = self.clone();
        if let Some(cert) = r.certificate.as_mut() {
            cert.key = "[REDACTED]".to_string();
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_ref_ownership() {
        let app = Uuid::new_v4();
        let route = Route { parent_ref: Route::app_parent_ref(app), ..Route::default() };
        assert!(route.belongs_to(app));
        assert!(!route.belongs_to(Uuid::new_v4()));
    }

    #[test]
    fn redaction_hides_tls_key() {
        let route = Route { certificate: Some(Certificate { id: None,
                                                            cert: "CERT".into(),
                                                            key: "SECRET".into() }),
                            ..Route::default() };
        let r = route.redacted();
        assert_eq!(r.certificate.as_ref().unwrap().key, "[REDACTED]");
        assert_eq!(route.certificate.unwrap().key, "SECRET");
    }
}
