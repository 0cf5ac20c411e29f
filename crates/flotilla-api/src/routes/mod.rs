//! Grupos de rutas HTTP. Cada módulo expone `routes()`.

pub mod app_routes;
pub mod apps;
mod crud;
pub mod deployments;
pub mod events;
pub mod formations;
pub mod jobs;
pub mod providers;
pub mod releases;
pub mod scale;
pub mod sinks;
pub mod system;

use flotilla_domain::{App, Release};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::state::ApiState;

/// App por id o por nombre.
pub(crate) async fn lookup_app(state: &ApiState, id_or_name: &str) -> Result<App> { Ok(state.apps.get(id_or_name).await?) }

/// Un id que no es uuid no puede existir.
pub(crate) fn parse_id(id: &str, what: &str) -> Result<Uuid> { Uuid::parse_str(id).map_err(|_| ApiError::not_found(what)) }

/// Release visible para la app: propio o todavía sin app.
pub(crate) async fn release_for_app(state: &ApiState, app: &App, release: &str) -> Result<Release> {
    let release = state.releases.get(parse_id(release, "release")?).await?;
    if release.app_id.is_some_and(|owner| owner != app.id) {
        return Err(ApiError::not_found("release"));
    }
    Ok(release)
}
