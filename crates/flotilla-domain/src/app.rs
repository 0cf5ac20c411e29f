//! Aplicación: unidad lógica de despliegue.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Labels};

/// Timeout por defecto (segundos) de cada espera de un despliegue.
pub const DEFAULT_DEPLOY_TIMEOUT: i32 = 30;

/// Longitud máxima (bytes) de un nombre de app.
pub const MAX_APP_NAME_LEN: usize = 100;

static APP_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("app name regex"));

/// Estrategias de despliegue soportadas (conjunto cerrado).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeploymentStrategy {
    #[default]
    #[serde(rename = "all-at-once")]
    AllAtOnce,
    #[serde(rename = "one-by-one")]
    OneByOne,
    #[serde(rename = "sirenia")]
    Sirenia,
    #[serde(rename = "discoverd-meta")]
    DiscoverdMeta,
}

impl DeploymentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStrategy::AllAtOnce => "all-at-once",
            DeploymentStrategy::OneByOne => "one-by-one",
            DeploymentStrategy::Sirenia => "sirenia",
            DeploymentStrategy::DiscoverdMeta => "discoverd-meta",
        }
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DeploymentStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-at-once" => Ok(DeploymentStrategy::AllAtOnce),
            "one-by-one" => Ok(DeploymentStrategy::OneByOne),
            "sirenia" => Ok(DeploymentStrategy::Sirenia),
            "discoverd-meta" => Ok(DeploymentStrategy::DiscoverdMeta),
            other => Err(DomainError::validation("strategy", format!("is not a valid deployment strategy: {other}"))),
        }
    }
}

/// App persistida. `id` nulo y timestamps vacíos indican una app aún no
/// insertada; el repositorio los completa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub meta: Labels,
    pub strategy: DeploymentStrategy,
    pub release_id: Option<Uuid>,
    pub deploy_timeout: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for App {
    fn default() -> Self {
        Self { id: Uuid::nil(),
               name: String::new(),
               meta: Labels::new(),
               strategy: DeploymentStrategy::default(),
               release_id: None,
               deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
               created_at: None,
               updated_at: None }
    }
}

impl App {
    pub fn new(name: &str) -> Self { Self { name: name.to_string(), ..Self::default() } }

    /// Apps del sistema marcadas con `meta.protected = "true"` no se pueden
    /// borrar.
    pub fn is_protected(&self) -> bool { self.meta.get("protected").map(|v| v == "true").unwrap_or(false) }

    pub fn is_system(&self) -> bool { self.meta.get("flynn-system-app").map(|v| v == "true").unwrap_or(false) }

    /// Reglas de validación previas a insertar/actualizar.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_app_name(&self.name)?;
        if self.deploy_timeout < 1 {
            return Err(DomainError::validation("deploy_timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Valida longitud (≤ 100 bytes) y forma `[a-z0-9]+(-[a-z0-9]+)*`.
pub fn validate_app_name(name: &str) -> Result<(), DomainError> {
    if name.len() > MAX_APP_NAME_LEN {
        return Err(DomainError::validation("name", format!("must be at most {MAX_APP_NAME_LEN} bytes")));
    }
    if !APP_NAME_RE.is_match(name) {
        return Err(DomainError::validation("name", "must match [a-z0-9]+(-[a-z0-9]+)*"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_boundary() {
        assert!(validate_app_name(&"a".repeat(100)).is_ok());
        assert!(validate_app_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn name_shape() {
        for ok in ["foo", "foo-bar", "a1-b2-c3", "0"] {
            assert!(validate_app_name(ok).is_ok(), "{ok} should be valid");
        }
        for bad in ["", "Foo", "foo_bar", "-foo", "foo-", "foo--bar", "foo bar"] {
            assert!(validate_app_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn strategy_parse_and_default() {
        assert_eq!(App::default().strategy, DeploymentStrategy::AllAtOnce);
        assert_eq!("one-by-one".parse::<DeploymentStrategy>().unwrap(), DeploymentStrategy::OneByOne);
        assert!("rolling".parse::<DeploymentStrategy>().is_err());
        let json = serde_json::to_string(&DeploymentStrategy::DiscoverdMeta).unwrap();
        assert_eq!(json, "\"discoverd-meta\"");
    }

    #[test]
    fn deploy_timeout_must_be_positive() {
        let mut app = App::new("web");
        app.deploy_timeout = 0;
        assert!(matches!(app.validate(), Err(DomainError::Validation { field, .. }) if field == "deploy_timeout"));
    }
}
