//! Clientes del cluster y de los agentes de host.
//!
//! Los hosts se descubren como instancias del servicio `flynn-host`; el
//! `id` del host viaja en la metadata de la instancia.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flotilla_core::deploy::{META_APP_ID, META_JOB_ID, META_PROCESS_TYPE, META_RELEASE_ID};
use flotilla_domain::{Labels, ProcessType, Release};
use log::info;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attach::{AttachClient, AttachRequest};
use crate::discoverd::DiscoverdClient;
use crate::error::{AdapterError, Result};
use crate::http::JsonClient;

pub const HOST_SERVICE: &str = "flynn-host";
const HOST_ID_META: &str = "id";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub args: Vec<String>,
    pub env: Labels,
    pub tty: bool,
    pub stdin: bool,
    pub host_network: bool,
    pub host_pid_namespace: bool,
    pub writeable_cgroups: bool,
}

/// Job tal como lo recibe un agente de host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostJob {
    /// Id de cluster `<host_id>-<uuid>`.
    pub id: String,
    pub metadata: Labels,
    pub config: ContainerConfig,
    pub artifacts: Vec<Uuid>,
    pub resurrect: bool,
}

impl HostJob {
    /// Job de un proceso del release: env del release y del tipo, metadata
    /// con los identificadores que usan discovery y el deployer.
    pub fn for_process(host_id: &str, app_id: Uuid, release: &Release, process_type: &str, proc: &ProcessType) -> Self {
        let uuid = Uuid::new_v4();
        let id = flotilla_domain::Job::cluster_id(host_id, uuid);
        let mut env = release.env.clone();
        env.extend(proc.env.clone());
        let mut metadata = release.meta.clone();
        metadata.insert(META_APP_ID.into(), app_id.to_string());
        metadata.insert(META_RELEASE_ID.into(), release.id.to_string());
        metadata.insert(META_PROCESS_TYPE.into(), process_type.to_string());
        metadata.insert(META_JOB_ID.into(), id.clone());
        Self { id,
               metadata,
               config: ContainerConfig { args: proc.args.clone(),
                                         env,
                                         host_network: proc.host_network,
                                         host_pid_namespace: proc.host_pid_namespace,
                                         writeable_cgroups: proc.writeable_cgroups,
                                         ..ContainerConfig::default() },
               artifacts: release.artifacts.clone(),
               resurrect: proc.resurrect }
    }
}

/// Job activo reportado por un host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveJob {
    pub job: HostJob,
    pub host_id: String,
    pub status: String,
    pub exit_status: Option<i32>,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct HostClient {
    id: String,
    http: JsonClient,
}

impl HostClient {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { id: id.into(),
               http: JsonClient::new(base_url) }
    }

    pub fn id(&self) -> &str { &self.id }

    /// `host:port` del agente, sin esquema.
    pub fn addr(&self) -> &str {
        let url = self.http.base_url();
        let url = url.split_once("://").map_or(url, |(_, rest)| rest);
        url.split('/').next().unwrap_or(url)
    }

    pub async fn add_job(&self, job: &HostJob) -> Result<()> {
        self.http.send_unit(Method::PUT, &format!("/host/jobs/{}", job.id), Some(job), "host job").await?;
        info!("host:job_added host={} job={}", self.id, job.id);
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<ActiveJob> { self.http.get(&format!("/host/jobs/{id}"), "job").await }

    pub async fn stop_job(&self, id: &str) -> Result<()> {
        self.http.delete(&format!("/host/jobs/{id}"), "job").await?;
        info!("host:job_stopped host={} job={id}", self.id);
        Ok(())
    }

    pub async fn list_jobs(&self) -> Result<HashMap<String, ActiveJob>> {
        let jobs: Option<HashMap<String, ActiveJob>> = self.http.get("/host/jobs", "host jobs").await?;
        Ok(jobs.unwrap_or_default())
    }

    pub async fn attach(&self, req: &AttachRequest, wait: bool) -> Result<AttachClient> {
        AttachClient::connect(self.addr(), req, wait).await
    }
}

#[derive(Clone, Debug)]
enum HostSource {
    Discoverd(DiscoverdClient),
    Static(Arc<Vec<HostClient>>),
}

#[derive(Clone, Debug)]
pub struct ClusterClient {
    source: HostSource,
}

impl ClusterClient {
    pub fn new(discoverd: DiscoverdClient) -> Self { Self { source: HostSource::Discoverd(discoverd) } }

    /// Lista fija de hosts, sin discovery.
    pub fn with_hosts(hosts: Vec<HostClient>) -> Self { Self { source: HostSource::Static(Arc::new(hosts)) } }

    pub async fn hosts(&self) -> Result<Vec<HostClient>> {
        match &self.source {
            HostSource::Static(hosts) => Ok(hosts.as_ref().clone()),
            HostSource::Discoverd(d) => {
                let instances = d.instances(HOST_SERVICE).await?;
                Ok(instances.into_iter()
                            .filter_map(|inst| {
                                let id = inst.meta_value(HOST_ID_META)?.to_string();
                                Some(HostClient::new(id, format!("http://{}", inst.addr)))
                            })
                            .collect())
            }
        }
    }

    pub async fn host(&self, id: &str) -> Result<HostClient> {
        self.hosts()
            .await?
            .into_iter()
            .find(|h| h.id() == id)
            .ok_or_else(|| AdapterError::NotFound(format!("host {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_addr_strips_scheme_and_path() {
        let h = HostClient::new("h1", "http://10.0.0.1:1113/");
        assert_eq!(h.addr(), "10.0.0.1:1113");
    }

    #[test]
    fn process_job_carries_discovery_metadata() {
        let app = Uuid::new_v4();
        let mut release = Release { id: Uuid::new_v4(),
                                    ..Release::default() };
        release.env.insert("A".into(), "release".into());
        let mut proc = ProcessType { args: vec!["web".into()],
                                     ..ProcessType::default() };
        proc.env.insert("A".into(), "proc".into());
        let job = HostJob::for_process("host1", app, &release, "web", &proc);
        assert!(job.id.starts_with("host1-"));
        assert_eq!(job.metadata.get(META_APP_ID), Some(&app.to_string()));
        assert_eq!(job.metadata.get(META_PROCESS_TYPE).map(String::as_str), Some("web"));
        assert_eq!(job.config.env.get("A").map(String::as_str), Some("proc"));
        assert_eq!(job.config.args, vec!["web".to_string()]);
    }

    #[tokio::test]
    async fn static_cluster_finds_host_by_id() {
        let cluster = ClusterClient::with_hosts(vec![HostClient::new("a", "http://a:1"), HostClient::new("b", "http://b:1")]);
        assert_eq!(cluster.host("b").await.unwrap().id(), "b");
        assert!(cluster.host("c").await.unwrap_err().is_not_found());
    }
}
