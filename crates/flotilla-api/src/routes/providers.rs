//! Providers y los recursos que aprovisionan.
//!
//! Crear un recurso llama al endpoint del provider y guarda el id externo y
//! el env devuelto; borrarlo lo libera en el provider antes del borrado
//! lógico.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use flotilla_adapters::ProviderClient;
use flotilla_domain::{Provider, Resource};
use serde::Deserialize;
use uuid::Uuid;

use super::{crud, lookup_app, parse_id};
use crate::error::{ApiError, Result};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/providers", get(list_providers).post(create_provider))
                 .route("/providers/:provider", get(get_provider))
                 .route("/providers/:provider/resources", get(list_resources).post(provision_resource))
                 .route("/providers/:provider/resources/:resource",
                        get(get_resource).put(put_resource).delete(delete_resource))
                 .route("/providers/:provider/resources/:resource/apps/:app",
                        axum::routing::put(add_resource_app).delete(remove_resource_app))
}

async fn create_provider(State(state): State<ApiState>, Json(provider): Json<Provider>) -> Result<impl IntoResponse> {
    crud::create(&state.providers, provider).await
}

async fn list_providers(State(state): State<ApiState>) -> Result<impl IntoResponse> { crud::list(&state.providers).await }

async fn get_provider(State(state): State<ApiState>, Path(provider): Path<String>) -> Result<impl IntoResponse> {
    crud::fetch(&state.providers, &provider).await
}

async fn provider_resource(state: &ApiState, provider: &Provider, id: &str) -> Result<Resource> {
    let resource = state.resources.get(parse_id(id, "resource")?).await?;
    if resource.provider_id != provider.id {
        return Err(ApiError::not_found("resource"));
    }
    Ok(resource)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProvisionBody {
    /// Configuración opaca que se pasa al provider.
    config: Option<serde_json::Value>,
    apps: Vec<Uuid>,
}

async fn provision_resource(State(state): State<ApiState>,
                            Path(provider): Path<String>,
                            Json(body): Json<ProvisionBody>)
                            -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    let provisioned = ProviderClient::new(&provider).provision(body.config.as_ref()).await?;
    let resource = Resource { provider_id: provider.id,
                              external_id: provisioned.id,
                              env: provisioned.env,
                              apps: body.apps,
                              ..Resource::default() };
    let resource = state.resources.add(resource).await?;
    tracing::info!(resource_id = %resource.id, provider = %provider.name, "resource provisioned");
    Ok((StatusCode::CREATED, Json(resource)))
}

/// Registra un recurso ya aprovisionado fuera del controlador.
async fn put_resource(State(state): State<ApiState>,
                      Path((provider, id)): Path<(String, String)>,
                      Json(mut resource): Json<Resource>)
                      -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    resource.id = parse_id(&id, "resource")?;
    resource.provider_id = provider.id;
    Ok(Json(state.resources.add(resource).await?))
}

async fn list_resources(State(state): State<ApiState>, Path(provider): Path<String>) -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    Ok(Json(state.resources.list_by_provider(provider.id).await?))
}

async fn get_resource(State(state): State<ApiState>, Path((provider, id)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    Ok(Json(provider_resource(&state, &provider, &id).await?))
}

async fn delete_resource(State(state): State<ApiState>, Path((provider, id)): Path<(String, String)>) -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    let resource = provider_resource(&state, &provider, &id).await?;
    ProviderClient::new(&provider).deprovision(&resource.external_id).await?;
    Ok(Json(state.resources.remove(resource.id).await?))
}

async fn add_resource_app(State(state): State<ApiState>,
                          Path((provider, id, app)): Path<(String, String, String)>)
                          -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    let resource = provider_resource(&state, &provider, &id).await?;
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.resources.add_app(resource.id, app.id).await?))
}

async fn remove_resource_app(State(state): State<ApiState>,
                             Path((provider, id, app)): Path<(String, String, String)>)
                             -> Result<impl IntoResponse> {
    let provider = state.providers.get(&provider).await?;
    let resource = provider_resource(&state, &provider, &id).await?;
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.resources.remove_app(resource.id, app.id).await?))
}
