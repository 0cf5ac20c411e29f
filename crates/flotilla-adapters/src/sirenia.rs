//! Endpoint de gestión de los peers sirenia (`/status`, `/stop`).

use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::{CoreError, Instance, SireniaClient};
use log::{debug, info};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::JsonClient;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaStatus {
    pub id: String,
    /// `startup`, `catchup`, `streaming`.
    pub state: String,
    pub sync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseStatus {
    pub read_write: bool,
    pub replicas: Vec<ReplicaStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerStatus {
    pub database: Option<DatabaseStatus>,
}

impl PeerStatus {
    pub fn is_read_write(&self) -> bool { self.database.as_ref().is_some_and(|d| d.read_write) }

    /// El downstream replica en streaming desde este peer.
    pub fn is_replicating_to(&self, downstream_id: &str) -> bool {
        self.database
            .as_ref()
            .is_some_and(|d| d.replicas.iter().any(|r| r.id == downstream_id && r.state == "streaming"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct SireniaHttpClient {
    poll_interval: Option<Duration>,
}

impl SireniaHttpClient {
    pub fn new() -> Self { Self::default() }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn peer(addr: &str) -> JsonClient {
        if addr.contains("://") {
            JsonClient::new(addr)
        } else {
            JsonClient::new(format!("http://{addr}"))
        }
    }

    pub async fn status(&self, addr: &str) -> Result<PeerStatus> { Self::peer(addr).get("/status", "peer status").await }

    /// Consulta `/status` hasta que `pred` se cumpla o venza `timeout`.
    /// Los errores de transporte se reintentan: el peer puede estar
    /// arrancando.
    async fn wait_for<F>(&self, addr: &str, timeout: Duration, what: &str, pred: F) -> std::result::Result<(), CoreError>
        where F: Fn(&PeerStatus) -> bool
    {
        let interval = self.poll_interval.unwrap_or(POLL_INTERVAL);
        let poll = async {
            loop {
                match self.status(addr).await {
                    Ok(st) if pred(&st) => return,
                    Ok(_) => debug!("sirenia:waiting addr={addr} for={what}"),
                    Err(e) => debug!("sirenia:status_error addr={addr} err={e}"),
                }
                tokio::time::sleep(interval).await;
            }
        };
        tokio::time::timeout(timeout, poll).await
                                           .map_err(|_| CoreError::Timeout(format!("{what} on {addr}")))
    }
}

#[async_trait]
impl SireniaClient for SireniaHttpClient {
    async fn stop(&self, addr: &str) -> std::result::Result<(), CoreError> {
        Self::peer(addr).send_unit::<()>(Method::POST, "/stop", None, "peer").await?;
        info!("sirenia:peer_stopped addr={addr}");
        Ok(())
    }

    async fn wait_for_repl_sync(&self, upstream: &Instance, downstream: &Instance, timeout: Duration) -> std::result::Result<(), CoreError> {
        let downstream_id = downstream.id.clone();
        self.wait_for(&upstream.addr, timeout, "replication sync", move |st| st.is_replicating_to(&downstream_id))
            .await
    }

    async fn wait_for_read_write(&self, addr: &str, timeout: Duration) -> std::result::Result<(), CoreError> {
        self.wait_for(addr, timeout, "read-write", PeerStatus::is_read_write).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replication_requires_streaming_replica() {
        let raw = serde_json::json!({
            "database": {"read_write": true, "replicas": [
                {"id": "a", "state": "catchup", "sync": true},
                {"id": "b", "state": "streaming"}
            ]}
        });
        let st: PeerStatus = serde_json::from_value(raw).unwrap();
        assert!(st.is_read_write());
        assert!(!st.is_replicating_to("a"));
        assert!(st.is_replicating_to("b"));
        assert!(!PeerStatus::default().is_read_write());
    }
}
