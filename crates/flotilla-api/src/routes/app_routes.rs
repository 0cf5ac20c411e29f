//! Rutas de ingreso de una app. Proxy al router con `parent_ref` fijado a
//! la app.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use flotilla_domain::{App, Route};

use super::lookup_app;
use crate::error::{ApiError, Result};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/apps/:app/routes", get(list_routes).post(create_route))
                 .route("/apps/:app/routes/:type/:id", get(get_route).put(update_route).delete(delete_route))
}

async fn owned_route(state: &ApiState, app: &App, route_type: &str, id: &str) -> Result<Route> {
    let route = state.router.get_route(route_type, id).await?;
    if !route.belongs_to(app.id) {
        return Err(ApiError::not_found("route"));
    }
    Ok(route)
}

async fn create_route(State(state): State<ApiState>, Path(app): Path<String>, Json(mut route): Json<Route>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    route.parent_ref = Route::app_parent_ref(app.id);
    route.validate()?;
    let route = state.router.create_route(&route).await?;
    tracing::info!(app_id = %app.id, route_type = %route.route_type, route_id = %route.id, "route created");
    Ok((StatusCode::CREATED, Json(route)))
}

async fn list_routes(State(state): State<ApiState>, Path(app): Path<String>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(state.router.list_routes(&Route::app_parent_ref(app.id)).await?))
}

async fn get_route(State(state): State<ApiState>, Path((app, route_type, id)): Path<(String, String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    Ok(Json(owned_route(&state, &app, &route_type, &id).await?))
}

async fn update_route(State(state): State<ApiState>,
                      Path((app, route_type, id)): Path<(String, String, String)>,
                      Json(mut route): Json<Route>)
                      -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    owned_route(&state, &app, &route_type, &id).await?;
    route.route_type = route_type;
    route.id = id;
    route.parent_ref = Route::app_parent_ref(app.id);
    route.validate()?;
    Ok(Json(state.router.update_route(&route).await?))
}

async fn delete_route(State(state): State<ApiState>, Path((app, route_type, id)): Path<(String, String, String)>) -> Result<impl IntoResponse> {
    let app = lookup_app(&state, &app).await?;
    let route = owned_route(&state, &app, &route_type, &id).await?;
    state.router.delete_route(&route_type, &id).await?;
    tracing::info!(app_id = %app.id, route_type = %route_type, route_id = %id, "route deleted");
    Ok(Json(route))
}
