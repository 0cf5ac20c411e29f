//! flotilla-adapters: clientes HTTP de los colaboradores externos del
//! controlador.
//!
//! - `router`: CRUD y stream de rutas.
//! - `discoverd`: service discovery (implementa `ServiceDiscovery`).
//! - `cluster`: hosts del cluster y agentes de host, con `attach`.
//! - `sirenia`: peers de bases de datos (implementa `SireniaClient`).
//! - `provider`: aprovisionamiento de recursos.
//! - `blobstore`: subida de backups.
//!
//! Todos comparten `JsonClient` y mapean respuestas no exitosas a
//! `AdapterError`, que a su vez se convierte en `CoreError`.

pub mod attach;
pub mod blobstore;
pub mod cluster;
pub mod discoverd;
pub mod error;
pub mod http;
pub mod provider;
pub mod router;
pub mod sirenia;
pub mod sse;

pub use attach::{AttachClient, AttachRequest};
pub use blobstore::BlobstoreClient;
pub use cluster::{ActiveJob, ClusterClient, HostClient, HostJob};
pub use discoverd::DiscoverdClient;
pub use error::AdapterError;
pub use http::JsonClient;
pub use provider::{ProviderClient, ProvisionedResource};
pub use router::{RouteEvent, RouterClient};
pub use sirenia::SireniaHttpClient;
