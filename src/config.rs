//! Configuración del controlador.
//!
//! Se lee de variables de entorno (con `.env` cargado una sola vez) y se
//! valida al arrancar; el resto del proceso sólo ve `ControllerConfig`.
use std::env;

use flotilla_api::{ApiConfig, AuthKeys};
use flotilla_domain::NameGenerator;
use flotilla_persistence::{init_dotenv, DbConfig};

use crate::errors::ConfigError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;
pub const DEFAULT_ROUTER_URL: &str = "http://router-api.discoverd";
pub const DEFAULT_DISCOVERD_URL: &str = "http://127.0.0.1:1111";
pub const DEFAULT_BLOBSTORE_URL: &str = "http://blobstore.discoverd";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub port: u16,
    pub auth_keys: Vec<String>,
    pub auth_key_ids: Vec<String>,
    pub ca_cert: Option<String>,
    pub default_route_domain: String,
    /// Semilla hex del generador de nombres; `None` usa entropía.
    pub name_seed: Option<String>,
    pub audit_log: bool,
    pub router_url: String,
    pub discoverd_url: String,
    pub blobstore_url: String,
    pub worker_concurrency: usize,
}

fn list(value: Option<String>) -> Vec<String> {
    value.map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
         .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> { value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) }

fn parse<T: std::str::FromStr>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
    where T::Err: std::fmt::Display
{
    match non_empty(value) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid { var, message: e.to_string() }),
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        init_dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let auth_keys = list(get("AUTH_KEY"));
        let auth_key_ids = list(get("AUTH_KEY_IDS"));
        if !auth_key_ids.is_empty() && auth_key_ids.len() != auth_keys.len() {
            return Err(ConfigError::AuthKeyMismatch { keys: auth_keys.len(),
                                                      ids: auth_key_ids.len() });
        }
        let name_seed = non_empty(get("NAME_SEED"));
        if let Some(seed) = &name_seed {
            NameGenerator::from_hex_seed(seed).map_err(|e| ConfigError::Invalid { var: "NAME_SEED",
                                                                                message: e.to_string() })?;
        }
        let worker_concurrency = parse("WORKER_CONCURRENCY", get("WORKER_CONCURRENCY"), DEFAULT_WORKER_CONCURRENCY)?;
        Ok(Self { port: parse("PORT", get("PORT"), DEFAULT_PORT)?,
                  auth_keys,
                  auth_key_ids,
                  ca_cert: non_empty(get("CA_CERT")),
                  default_route_domain: non_empty(get("DEFAULT_ROUTE_DOMAIN")).unwrap_or_default(),
                  name_seed,
                  audit_log: parse("AUDIT_LOG", get("AUDIT_LOG"), false)?,
                  router_url: non_empty(get("ROUTER_URL")).unwrap_or_else(|| DEFAULT_ROUTER_URL.into()),
                  discoverd_url: non_empty(get("DISCOVERD_URL")).unwrap_or_else(|| DEFAULT_DISCOVERD_URL.into()),
                  blobstore_url: non_empty(get("BLOBSTORE_URL")).unwrap_or_else(|| DEFAULT_BLOBSTORE_URL.into()),
                  worker_concurrency: worker_concurrency.max(1) })
    }

    pub fn db(&self) -> Result<DbConfig, flotilla_persistence::PersistenceError> { DbConfig::from_env() }

    pub fn names(&self) -> NameGenerator {
        self.name_seed
            .as_deref()
            .and_then(|seed| NameGenerator::from_hex_seed(seed).ok())
            .unwrap_or_else(NameGenerator::from_entropy)
    }

    pub fn api(&self) -> ApiConfig {
        ApiConfig { auth_keys: AuthKeys::new(self.auth_keys.clone(), self.auth_key_ids.clone()),
                    ca_cert: self.ca_cert.clone(),
                    audit_log: self.audit_log }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.worker_concurrency, DEFAULT_WORKER_CONCURRENCY);
        assert!(cfg.auth_keys.is_empty());
        assert!(!cfg.audit_log);
        assert_eq!(cfg.router_url, DEFAULT_ROUTER_URL);
    }

    #[test]
    fn keys_and_ids_must_pair_up() {
        let cfg = config(&[("AUTH_KEY", "a, b"), ("AUTH_KEY_IDS", "ka,kb")]).unwrap();
        assert_eq!(cfg.auth_keys, vec!["a", "b"]);
        let err = config(&[("AUTH_KEY", "a,b"), ("AUTH_KEY_IDS", "ka")]).unwrap_err();
        assert_eq!(err, ConfigError::AuthKeyMismatch { keys: 2, ids: 1 });
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(config(&[("NAME_SEED", "zz-not-hex")]), Err(ConfigError::Invalid { var: "NAME_SEED", .. })));
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { var: "PORT", .. })));
        assert!(matches!(config(&[("AUDIT_LOG", "yes")]), Err(ConfigError::Invalid { var: "AUDIT_LOG", .. })));
    }

    #[test]
    fn audit_flag_and_worker_floor() {
        let cfg = config(&[("AUDIT_LOG", "true"), ("WORKER_CONCURRENCY", "0")]).unwrap();
        assert!(cfg.audit_log);
        assert_eq!(cfg.worker_concurrency, 1);
    }
}
