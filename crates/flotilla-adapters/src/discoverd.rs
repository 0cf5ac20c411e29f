//! Service discovery sobre el API HTTP de discoverd.
//!
//! `GET /services/<name>` con `Accept: text/event-stream` entrega primero
//! un `up` por instancia viva, luego `current` y después los cambios en
//! vivo. La metadata del servicio se lee y escribe en
//! `/services/<name>/meta` con índice para escritura condicional.

use async_trait::async_trait;
use flotilla_core::{CoreError, DiscoveryEvent, Instance, ServiceDiscovery, ServiceMeta};
use log::debug;
use reqwest::Method;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::http::JsonClient;

#[derive(Clone, Debug)]
pub struct DiscoverdClient {
    http: JsonClient,
}

impl DiscoverdClient {
    pub fn new(base_url: impl Into<String>) -> Self { Self { http: JsonClient::new(base_url) } }

    pub async fn instances(&self, service: &str) -> Result<Vec<Instance>> {
        let list: Option<Vec<Instance>> = self.http.get_opt(&format!("/services/{service}/instances"), "service").await?;
        Ok(list.unwrap_or_default())
    }

    pub async fn leader(&self, service: &str) -> Result<Option<Instance>> {
        self.http.get_opt(&format!("/services/{service}/leader"), "service leader").await
    }
}

#[async_trait]
impl ServiceDiscovery for DiscoverdClient {
    async fn watch(&self, service: &str) -> std::result::Result<mpsc::Receiver<DiscoveryEvent>, CoreError> {
        debug!("discoverd:watch service={service}");
        Ok(self.http.stream(&format!("/services/{service}"), "service").await?)
    }

    async fn get_meta(&self, service: &str) -> std::result::Result<Option<ServiceMeta>, CoreError> {
        Ok(self.http.get_opt(&format!("/services/{service}/meta"), "service meta").await?)
    }

    async fn set_meta(&self, service: &str, meta: &ServiceMeta) -> std::result::Result<(), CoreError> {
        self.http.send_unit(Method::PUT, &format!("/services/{service}/meta"), Some(meta), "service meta").await?;
        debug!("discoverd:meta_set service={service} index={}", meta.index);
        Ok(())
    }
}
