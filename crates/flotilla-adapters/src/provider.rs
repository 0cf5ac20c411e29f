//! Aprovisionamiento de recursos contra el endpoint HTTP de un provider.
//!
//! `POST <url>` con la configuración devuelve `{id, env}`;
//! `DELETE <url>` con `{id}` libera el recurso.

use flotilla_domain::{Labels, Provider};
use log::info;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::JsonClient;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionedResource {
    pub id: String,
    pub env: Labels,
}

#[derive(Serialize)]
struct DeprovisionRequest<'a> {
    id: &'a str,
}

#[derive(Clone, Debug)]
pub struct ProviderClient {
    http: JsonClient,
}

impl ProviderClient {
    pub fn new(provider: &Provider) -> Self { Self { http: JsonClient::new(provider.url.clone()) } }

    /// `config` vacío se envía como `{}`.
    pub async fn provision(&self, config: Option<&serde_json::Value>) -> Result<ProvisionedResource> {
        let empty = serde_json::json!({});
        let body = config.unwrap_or(&empty);
        let res: ProvisionedResource = self.http.send_json(Method::POST, "", body, "provider").await?;
        info!("provider:provisioned url={} external_id={}", self.http.base_url(), res.id);
        Ok(res)
    }

    pub async fn deprovision(&self, external_id: &str) -> Result<()> {
        self.http
            .send_unit(Method::DELETE, "", Some(&DeprovisionRequest { id: external_id }), "provider resource")
            .await?;
        info!("provider:deprovisioned url={} external_id={external_id}", self.http.base_url());
        Ok(())
    }
}
