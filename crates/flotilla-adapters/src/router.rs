//! Cliente del API del router. El router es el sistema de registro de las
//! rutas; el controlador sólo hace de proxy.

use flotilla_domain::Route;
use log::info;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::http::JsonClient;

/// Evento de cambio de ruta publicado por el router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteEvent {
    /// `set` o `remove`.
    pub event: String,
    pub id: String,
    pub route: Option<Route>,
}

#[derive(Clone, Debug)]
pub struct RouterClient {
    http: JsonClient,
}

impl RouterClient {
    pub fn new(base_url: impl Into<String>) -> Self { Self { http: JsonClient::new(base_url) } }

    pub async fn create_route(&self, route: &Route) -> Result<Route> {
        let created: Route = self.http.send_json(Method::POST, "/routes", route, "route").await?;
        info!("router:route_created type={} id={} parent={}", created.route_type, created.id, created.parent_ref);
        Ok(created)
    }

    pub async fn get_route(&self, route_type: &str, id: &str) -> Result<Route> {
        self.http.get(&format!("/routes/{route_type}/{id}"), "route").await
    }

    /// Rutas cuyo `parent_ref` coincide; vacío lista todas.
    pub async fn list_routes(&self, parent_ref: &str) -> Result<Vec<Route>> {
        let path = if parent_ref.is_empty() {
            "/routes".to_string()
        } else {
            format!("/routes?parent_ref={}", encode_query(parent_ref))
        };
        let routes: Option<Vec<Route>> = self.http.get(&path, "routes").await?;
        Ok(routes.unwrap_or_default())
    }

    pub async fn update_route(&self, route: &Route) -> Result<Route> {
        let path = format!("/routes/{}/{}", route.route_type, route.id);
        self.http.send_json(Method::PUT, &path, route, "route").await
    }

    pub async fn delete_route(&self, route_type: &str, id: &str) -> Result<()> {
        self.http.delete(&format!("/routes/{route_type}/{id}"), "route").await?;
        info!("router:route_deleted type={route_type} id={id}");
        Ok(())
    }

    pub async fn stream_events(&self) -> Result<mpsc::Receiver<RouteEvent>> { self.http.stream("/events", "route events").await }
}

/// Codificación mínima para valores de query (`apps/<uuid>` sólo necesita
/// escapar `/`).
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_ref_is_percent_encoded() {
        assert_eq!(encode_query("apps/1f2e"), "apps%2F1f2e");
    }
}
