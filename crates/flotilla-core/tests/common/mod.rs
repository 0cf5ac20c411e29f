//! Cluster en memoria para los tests del motor de despliegues.
//!
//! Reconciliar una formation arranca o para jobs al instante y publica los
//! eventos de job (y de discovery para los tipos con servicio) a todos los
//! suscriptores abiertos.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flotilla_core::deploy::{META_APP_ID, META_JOB_ID, META_PROCESS_TYPE, META_RELEASE_ID};
use flotilla_core::{CoreError, DeployBackend, DeployContext, DiscoveryEvent, DiscoveryEventKind, Instance, ServiceDiscovery,
                    ServiceMeta, SireniaClient};
use flotilla_domain::{DeploymentEvent, DeploymentStatus, DomainError, Formation, Job, JobState, Labels, ProcessType, Release};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
pub struct State {
    pub releases: HashMap<Uuid, Release>,
    pub formations: HashMap<(Uuid, Uuid), Formation>,
    pub jobs: Vec<Job>,
    pub instances: Vec<(String, Instance)>,
    pub meta: HashMap<String, ServiceMeta>,
    pub events: Vec<DeploymentEvent>,
    pub finished: Option<DeploymentStatus>,
    pub app_release: Option<Uuid>,
    /// Si está activo, las formations se guardan pero no arrancan jobs.
    pub stuck: bool,
    pub host_error: Option<String>,
    pub syncs: Vec<(String, String)>,
    pub read_writes: Vec<String>,
    job_subs: Vec<mpsc::Sender<Job>>,
    watchers: Vec<(String, mpsc::Sender<DiscoveryEvent>)>,
    next_addr: u32,
}

impl State {
    fn broadcast_job(&mut self, job: &Job) { self.job_subs.retain(|tx| tx.try_send(job.clone()).is_ok()); }

    fn broadcast_discovery(&mut self, service: &str, event: DiscoveryEvent) {
        for (s, tx) in &self.watchers {
            if s == service {
                let _ = tx.try_send(event.clone());
            }
        }
    }

    pub fn start_job(&mut self, app_id: Uuid, release: &Release, typ: &str) -> Job {
        let uuid = Uuid::new_v4();
        let mut job = Job { uuid,
                            id: Job::cluster_id("host0", uuid),
                            host_id: "host0".into(),
                            app_id,
                            release_id: release.id,
                            process_type: typ.to_string(),
                            state: JobState::Starting,
                            ..Job::default() };
        self.broadcast_job(&job);
        if let Some(err) = self.host_error.clone() {
            job.state = JobState::Failed;
            job.host_error = Some(err);
            self.broadcast_job(&job);
            self.jobs.push(job.clone());
            return job;
        }
        job.state = JobState::Up;
        self.broadcast_job(&job);
        if let Some(service) = release.processes.get(typ).and_then(|p| p.service.clone()) {
            self.next_addr += 1;
            let mut meta = Labels::new();
            meta.insert(META_APP_ID.into(), app_id.to_string());
            meta.insert(META_RELEASE_ID.into(), release.id.to_string());
            meta.insert(META_PROCESS_TYPE.into(), typ.to_string());
            meta.insert(META_JOB_ID.into(), job.id.clone());
            let inst = Instance { id: job.id.clone(),
                                  addr: format!("10.0.0.{}:5432", self.next_addr),
                                  meta };
            self.instances.push((service.clone(), inst.clone()));
            self.broadcast_discovery(&service, DiscoveryEvent::instance(&service, DiscoveryEventKind::Up, inst));
        }
        self.jobs.push(job.clone());
        job
    }

    fn stop_job(&mut self, idx: usize) {
        self.jobs[idx].state = JobState::Down;
        let job = self.jobs[idx].clone();
        self.broadcast_job(&job);
        if let Some(pos) = self.instances.iter().position(|(_, i)| i.id == job.id) {
            let (service, inst) = self.instances.remove(pos);
            self.broadcast_discovery(&service, DiscoveryEvent::instance(&service, DiscoveryEventKind::Down, inst));
        }
    }

    fn reconcile(&mut self, f: &Formation) {
        if self.stuck {
            return;
        }
        let Some(release) = self.releases.get(&f.release_id).cloned() else { return };
        for (typ, want) in &f.processes {
            let running: Vec<usize> = self.jobs
                                          .iter()
                                          .enumerate()
                                          .filter(|(_, j)| j.release_id == f.release_id && &j.process_type == typ && j.state == JobState::Up)
                                          .map(|(i, _)| i)
                                          .collect();
            let want = (*want).max(0) as usize;
            if running.len() < want {
                for _ in running.len()..want {
                    self.start_job(f.app_id, &release, typ);
                }
            } else {
                for idx in running[want..].to_vec() {
                    self.stop_job(idx);
                }
            }
        }
    }

    pub fn new_instances(&self, release: Uuid) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|(_, i)| i.release_id() == Some(release))
            .map(|(_, i)| i.clone())
            .collect()
    }

    pub fn job_events(&self, state: JobState) -> usize { self.events.iter().filter(|e| e.job_state == Some(state)).count() }
}

pub struct FakeCluster {
    pub hosts: usize,
    pub state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { hosts: 1,
                        state: Mutex::new(State::default()) })
    }

    pub fn context(self: &Arc<Self>) -> DeployContext {
        DeployContext { backend: self.clone(),
                        discovery: self.clone(),
                        sirenia: self.clone() }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R { f(&mut self.state.lock().unwrap()) }

    pub fn add_release(&self, release: Release) { self.with(|s| s.releases.insert(release.id, release)); }

    /// Formation vieja ya convergida: la guarda y arranca los jobs sin
    /// publicar nada.
    pub fn seed_formation(&self, app_id: Uuid, release_id: Uuid, processes: &[(&str, i32)]) {
        self.with(|s| {
                let release = s.releases[&release_id].clone();
                let procs: BTreeMap<String, i32> = processes.iter().map(|(t, n)| (t.to_string(), *n)).collect();
                for (typ, n) in &procs {
                    for _ in 0..*n {
                        s.start_job(app_id, &release, typ);
                    }
                }
                s.formations.insert((app_id, release_id), Formation::new(app_id, release_id, procs));
            });
    }
}

pub fn release(processes: &[(&str, Option<&str>)]) -> Release {
    let mut r = Release { id: Uuid::new_v4(),
                          ..Release::default() };
    for (typ, service) in processes {
        r.processes.insert(typ.to_string(),
                           ProcessType { service: service.map(str::to_string),
                                         ..ProcessType::default() });
    }
    r
}

#[async_trait]
impl DeployBackend for FakeCluster {
    async fn host_count(&self) -> Result<usize, CoreError> { Ok(self.hosts) }

    async fn get_release(&self, id: Uuid) -> Result<Release, CoreError> {
        self.with(|s| s.releases.get(&id).cloned())
            .ok_or_else(|| DomainError::not_found(format!("release {id}")).into())
    }

    async fn get_formation(&self, app_id: Uuid, release_id: Uuid) -> Result<Option<Formation>, CoreError> {
        Ok(self.with(|s| s.formations.get(&(app_id, release_id)).cloned()))
    }

    async fn put_formation(&self, formation: &Formation) -> Result<(), CoreError> {
        self.with(|s| {
                s.formations.insert((formation.app_id, formation.release_id), formation.clone());
                s.reconcile(formation);
            });
        Ok(())
    }

    async fn list_jobs(&self, app_id: Uuid) -> Result<Vec<Job>, CoreError> {
        Ok(self.with(|s| s.jobs.iter().filter(|j| j.app_id == app_id).cloned().collect()))
    }

    async fn subscribe_jobs(&self, _app_id: Uuid) -> Result<mpsc::Receiver<Job>, CoreError> {
        let (tx, rx) = mpsc::channel(1000);
        self.with(|s| s.job_subs.push(tx));
        Ok(rx)
    }

    async fn set_app_release(&self, _app_id: Uuid, release_id: Uuid) -> Result<(), CoreError> {
        self.with(|s| s.app_release = Some(release_id));
        Ok(())
    }

    async fn record_event(&self, event: DeploymentEvent) -> Result<(), CoreError> {
        self.with(|s| s.events.push(event));
        Ok(())
    }

    async fn finish(&self, _deployment_id: Uuid, status: DeploymentStatus) -> Result<(), CoreError> {
        self.with(|s| s.finished = Some(status));
        Ok(())
    }
}

#[async_trait]
impl ServiceDiscovery for FakeCluster {
    async fn watch(&self, service: &str) -> Result<mpsc::Receiver<DiscoveryEvent>, CoreError> {
        let (tx, rx) = mpsc::channel(1000);
        self.with(|s| {
                for (svc, inst) in &s.instances {
                    if svc == service {
                        let _ = tx.try_send(DiscoveryEvent::instance(service, DiscoveryEventKind::Up, inst.clone()));
                    }
                }
                if let Some(meta) = s.meta.get(service) {
                    let _ = tx.try_send(DiscoveryEvent::meta(service, meta.clone()));
                }
                let _ = tx.try_send(DiscoveryEvent::current(service));
                s.watchers.push((service.to_string(), tx));
            });
        Ok(rx)
    }

    async fn get_meta(&self, service: &str) -> Result<Option<ServiceMeta>, CoreError> { Ok(self.with(|s| s.meta.get(service).cloned())) }

    async fn set_meta(&self, service: &str, meta: &ServiceMeta) -> Result<(), CoreError> {
        self.with(|s| s.meta.insert(service.to_string(), meta.clone()));
        Ok(())
    }
}

#[async_trait]
impl SireniaClient for FakeCluster {
    async fn stop(&self, addr: &str) -> Result<(), CoreError> {
        self.with(|s| {
                let job_id = s.instances
                              .iter()
                              .find(|(_, i)| i.addr == addr)
                              .map(|(_, i)| i.id.clone())
                              .ok_or_else(|| CoreError::backend(format!("no peer at {addr}")))?;
                let idx = s.jobs
                           .iter()
                           .position(|j| j.id == job_id)
                           .ok_or_else(|| CoreError::backend(format!("no job {job_id}")))?;
                s.stop_job(idx);
                Ok(())
            })
    }

    async fn wait_for_repl_sync(&self, upstream: &Instance, downstream: &Instance, _timeout: Duration) -> Result<(), CoreError> {
        self.with(|s| s.syncs.push((upstream.id.clone(), downstream.id.clone())));
        Ok(())
    }

    async fn wait_for_read_write(&self, addr: &str, _timeout: Duration) -> Result<(), CoreError> {
        self.with(|s| s.read_writes.push(addr.to_string()));
        Ok(())
    }
}
