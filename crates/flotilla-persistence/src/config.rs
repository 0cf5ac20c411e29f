//! Parámetros del pool Postgres.
//!
//! `DATABASE_URL` es obligatoria; `DATABASE_MIN_CONNECTIONS` y
//! `DATABASE_MAX_CONNECTIONS` ajustan el pool. El `.env` se carga una sola
//! vez por proceso, la primera vez que alguien pide configuración.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

static DOTENV: Lazy<bool> = Lazy::new(|| dotenv().is_ok());

/// Carga `.env` si existe. Idempotente.
pub fn init_dotenv() {
    if *DOTENV {
        log::debug!("config:dotenv loaded=true");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(),
               min_connections: DEFAULT_MIN_CONNECTIONS,
               max_connections: DEFAULT_MAX_CONNECTIONS }
    }

    pub fn from_env() -> Result<Self, PersistenceError> {
        init_dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// `max` nunca queda por debajo de `min` ni de 1.
    pub fn from_lookup<F>(get: F) -> Result<Self, PersistenceError>
        where F: Fn(&str) -> Option<String>
    {
        let url = get("DATABASE_URL").filter(|u| !u.trim().is_empty())
                                     .ok_or_else(|| PersistenceError::Config("DATABASE_URL not set".into()))?;
        let pool_size = |var: &str, default: u32| -> Result<u32, PersistenceError> {
            match get(var) {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|_| PersistenceError::Config(format!("{var}: not a number: {v}"))),
            }
        };
        let min_connections = pool_size("DATABASE_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS)?;
        let max_connections = pool_size("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        Ok(Self { url,
                  min_connections,
                  max_connections: max_connections.max(min_connections).max(1) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn url_is_required() {
        assert!(matches!(DbConfig::from_lookup(lookup(&[])), Err(PersistenceError::Config(_))));
        assert!(DbConfig::from_lookup(lookup(&[("DATABASE_URL", " ")])).is_err());
    }

    #[test]
    fn pool_bounds() {
        let cfg = DbConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x/db")])).unwrap();
        assert_eq!(cfg, DbConfig::new("postgres://x/db"));

        let cfg = DbConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x/db"),
                                                 ("DATABASE_MIN_CONNECTIONS", "8"),
                                                 ("DATABASE_MAX_CONNECTIONS", "4")])).unwrap();
        assert_eq!((cfg.min_connections, cfg.max_connections), (8, 8));

        let err = DbConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x/db"), ("DATABASE_MAX_CONNECTIONS", "many")]));
        assert!(err.is_err());
    }
}
