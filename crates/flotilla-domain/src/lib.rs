//! flotilla-domain
//!
//! Modelo lógico del controlador: aplicaciones, releases, artifacts,
//! formaciones, despliegues, jobs y el resto de entidades que el control
//! plane persiste y narra como eventos.
//!
//! Este crate no conoce la base de datos ni el transporte; sólo define los
//! tipos, los conjuntos cerrados (estrategias, estados) y las reglas de
//! validación que todas las capas comparten.

pub mod app;
pub mod artifact;
pub mod backup;
pub mod deployment;
pub mod domain_migration;
pub mod error;
pub mod event;
pub mod formation;
pub mod job;
pub mod key;
pub mod label_filter;
pub mod names;
pub mod release;
pub mod resource;
pub mod route;
pub mod scale;
pub mod sink;
pub mod volume;

pub use app::{validate_app_name, App, DeploymentStrategy, DEFAULT_DEPLOY_TIMEOUT};
pub use artifact::{Artifact, ArtifactType};
pub use backup::{Backup, BackupStatus};
pub use deployment::{Deployment, DeploymentEvent, DeploymentStatus};
pub use domain_migration::DomainMigration;
pub use error::DomainError;
pub use event::{Event, EventOp, EventType};
pub use formation::{ExpandedFormation, Formation, Processes, Tags};
pub use job::{Job, JobState};
pub use key::Key;
pub use label_filter::{LabelFilter, LabelFilterExpression, LabelFilterOp};
pub use names::NameGenerator;
pub use release::{ProcessType, Release, ReleaseType};
pub use resource::{Provider, Resource};
pub use route::Route;
pub use scale::{ScaleRequest, ScaleRequestState};
pub use sink::Sink;
pub use volume::Volume;

/// Mapa de etiquetas `clave -> valor` usado por apps, releases y jobs.
pub type Labels = std::collections::BTreeMap<String, String>;
