//! Formación: número deseado de procesos para un par (app, release).
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{App, Artifact, DomainError, Labels, Release, ScaleRequest};

/// `tipo -> cantidad`. Una clave con 0 sigue significando "existe".
pub type Processes = BTreeMap<String, i32>;

/// `tipo -> etiquetas` para restricciones de ubicación.
pub type Tags = BTreeMap<String, Labels>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formation {
    pub app_id: Uuid,
    pub release_id: Uuid,
    pub processes: Processes,
    pub tags: Tags,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Formation {
    pub fn new(app_id: Uuid, release_id: Uuid, processes: Processes) -> Self {
        Self { app_id,
               release_id,
               processes,
               ..Self::default() }
    }

    /// Una formación con todos los contadores a cero está inactiva.
    pub fn is_active(&self) -> bool { self.processes.values().any(|n| *n > 0) }

    pub fn count(&self, typ: &str) -> i32 { self.processes.get(typ).copied().unwrap_or(0) }
}

/// Comprueba que cada clave de `processes` exista en el release.
///
/// El error lista los nombres desconocidos, ordenados.
pub fn validate_processes(release: &Release, processes: &Processes) -> Result<(), DomainError> {
    let unknown: Vec<&str> = processes.keys()
                                      .filter(|typ| !release.has_process(typ))
                                      .map(String::as_str)
                                      .collect();
    if !unknown.is_empty() {
        return Err(DomainError::validation("processes",
                                           format!("requested formation includes process types that do not exist in release: {}",
                                                   unknown.join(", "))));
    }
    for (typ, n) in processes {
        if *n < 0 {
            return Err(DomainError::validation("processes", format!("{typ}: count must not be negative")));
        }
    }
    Ok(())
}

/// Formación expandida con app, release y artifacts, tal como la consume el
/// scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedFormation {
    pub app: App,
    pub release: Release,
    pub artifacts: Vec<Artifact>,
    pub processes: Processes,
    pub tags: Tags,
    pub pending_scale_request: Option<ScaleRequest>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessType;

    fn release_with(types: &[&str]) -> Release {
        let mut r = Release::default();
        for t in types {
            r.processes.insert((*t).to_string(), ProcessType::default());
        }
        r
    }

    #[test]
    fn unknown_process_types_are_named() {
        let release = release_with(&["web"]);
        let mut procs = Processes::new();
        procs.insert("web".into(), 1);
        procs.insert("worker".into(), 2);
        procs.insert("clock".into(), 0);
        let err = validate_processes(&release, &procs).unwrap_err();
        match err {
            DomainError::Validation { message, .. } => assert!(message.ends_with("clock, worker"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_counts_are_inactive_but_present() {
        let mut f = Formation::new(Uuid::new_v4(), Uuid::new_v4(), Processes::new());
        f.processes.insert("web".into(), 0);
        assert!(!f.is_active());
        assert_eq!(f.count("web"), 0);
        f.processes.insert("web".into(), 2);
        assert!(f.is_active());
    }
}
