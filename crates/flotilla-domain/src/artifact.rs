use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Labels};

/// Tipo de artifact. El par `(type, uri)` identifica un artifact vivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Imagen de contenedor.
    Docker,
    /// Blob de fichero (capa adicional de un release).
    File,
    /// Manifest de imagen propio de la plataforma.
    Flynn,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Docker => "docker",
            ArtifactType::File => "file",
            ArtifactType::Flynn => "flynn",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ArtifactType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(ArtifactType::Docker),
            "file" => Ok(ArtifactType::File),
            "flynn" => Ok(ArtifactType::Flynn),
            other => Err(DomainError::validation("type", format!("unknown artifact type: {other}"))),
        }
    }
}

/// Referencia inmutable a una imagen o fichero almacenado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub uri: String,
    #[serde(default)]
    pub meta: Labels,
    #[serde(default)]
    pub hashes: Labels,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_manifest: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_url_template: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Artifact {
    pub fn new(artifact_type: ArtifactType, uri: &str) -> Self {
        Self { id: Uuid::nil(),
               artifact_type,
               uri: uri.to_string(),
               meta: Labels::new(),
               hashes: Labels::new(),
               size: 0,
               raw_manifest: None,
               layer_url_template: None,
               created_at: None }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.uri.trim().is_empty() {
            return Err(DomainError::validation("uri", "must not be empty"));
        }
        Ok(())
    }
}
