//! Estado de un despliegue en curso y espera de eventos de job.
//!
//! Los eventos observados (jobs del scheduler, instancias de discovery y
//! errores de stream) llegan por un único canal y se reparten en colas por
//! release: un evento de otro release recibido mientras se espera por uno
//! no se pierde, queda en su cola hasta que alguien espere por él.
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use flotilla_domain::{Deployment, DeploymentEvent, Formation, Job, JobState, Release};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::backend::{DeployBackend, DiscoveryEvent, DiscoveryEventKind, ServiceDiscovery, ServiceMeta, SireniaClient};
use crate::constants::{DEFAULT_STEP_TIMEOUT, DISCOVERY_CURRENT_TIMEOUT, EVENT_BUFFER_SIZE};
use crate::errors::CoreError;

/// Conteos esperados u observados: tipo de proceso → estado → número.
pub type JobEvents = BTreeMap<String, BTreeMap<JobState, i32>>;

pub(crate) fn expect(events: &mut JobEvents, typ: &str, state: JobState, n: i32) {
    if n > 0 {
        *events.entry(typ.to_string()).or_default().entry(state).or_insert(0) += n;
    }
}

/// Igualdad restringida a las claves esperadas.
pub(crate) fn satisfied(expected: &JobEvents, actual: &JobEvents) -> bool {
    expected.iter().all(|(typ, states)| {
                       actual.get(typ)
                             .map(|got| states.iter().all(|(s, n)| got.get(s).copied().unwrap_or(0) == *n))
                             .unwrap_or(false)
                   })
}

#[derive(Debug, Clone)]
pub(crate) enum Observed {
    Job(Job),
    Discovery(DiscoveryEvent),
    Error(String),
}

impl Observed {
    fn release_id(&self) -> Option<Uuid> {
        match self {
            Observed::Job(job) => Some(job.release_id),
            Observed::Discovery(ev) => ev.instance.as_ref().and_then(|i| i.release_id()),
            Observed::Error(_) => None,
        }
    }
}

/// Colaboradores compartidos por todos los despliegues.
#[derive(Clone)]
pub struct DeployContext {
    pub backend: Arc<dyn DeployBackend>,
    pub discovery: Arc<dyn ServiceDiscovery>,
    pub sirenia: Arc<dyn SireniaClient>,
}

pub struct DeployJob {
    pub(super) deployment: Deployment,
    pub(super) ctx: DeployContext,
    pub(super) cancel: CancellationToken,
    pub(super) old_release: Option<Release>,
    pub(super) new_release: Release,
    pub(super) old_formation: Formation,
    pub(super) new_formation: Formation,
    /// Tipos sin servicio registrado: su "up" viene de eventos de job.
    pub(super) use_job_events: HashSet<String>,
    pub(super) service_names: BTreeMap<String, String>,
    pub(super) service_meta: Option<ServiceMeta>,
    pub(super) omni: HashSet<String>,
    pub(super) host_count: i32,
    /// Instancias "up" observadas al arrancar, por tipo.
    pub(super) old_state: BTreeMap<String, i32>,
    pub(super) new_state: BTreeMap<String, i32>,
    pub(super) step_timeout: Duration,
    known_job_states: HashSet<(String, JobState)>,
    observed_rx: mpsc::Receiver<Observed>,
    observed_tx: mpsc::Sender<Observed>,
    pending: HashMap<Uuid, VecDeque<Observed>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for DeployJob {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl DeployJob {
    /// Carga releases y formations, abre los streams y siembra los conteos
    /// con el estado actual del cluster.
    pub async fn prepare(deployment: Deployment, ctx: DeployContext, cancel: CancellationToken) -> Result<Self, CoreError> {
        let backend = ctx.backend.clone();
        let app_id = deployment.app_id;

        let host_count = backend.host_count().await? as i32;
        let old_release = match deployment.old_release_id {
            Some(id) => Some(backend.get_release(id).await?),
            None => None,
        };
        let new_release = backend.get_release(deployment.new_release_id).await?;

        let old_formation = match deployment.old_release_id {
            Some(id) => backend.get_formation(app_id, id)
                              .await?
                              .unwrap_or_else(|| Formation::new(app_id, id, Default::default())),
            None => Formation::new(app_id, Uuid::nil(), Default::default()),
        };
        let mut new_formation = backend.get_formation(app_id, deployment.new_release_id)
                                       .await?
                                       .unwrap_or_else(|| Formation::new(app_id, deployment.new_release_id, Default::default()));
        if !deployment.tags.is_empty() {
            new_formation.tags = deployment.tags.clone();
        }

        let step_timeout = if deployment.deploy_timeout > 0 {
            Duration::from_secs(deployment.deploy_timeout as u64)
        } else {
            DEFAULT_STEP_TIMEOUT
        };
        let (observed_tx, observed_rx) = mpsc::channel(EVENT_BUFFER_SIZE);

        let mut job = DeployJob { deployment,
                                  ctx,
                                  cancel,
                                  old_release,
                                  new_release,
                                  old_formation,
                                  new_formation,
                                  use_job_events: HashSet::new(),
                                  service_names: BTreeMap::new(),
                                  service_meta: None,
                                  omni: HashSet::new(),
                                  host_count,
                                  old_state: BTreeMap::new(),
                                  new_state: BTreeMap::new(),
                                  step_timeout,
                                  known_job_states: HashSet::new(),
                                  observed_rx,
                                  observed_tx,
                                  pending: HashMap::new(),
                                  tasks: Vec::new() };

        let processes: Vec<(String, bool, Option<String>)> =
            job.new_release
               .processes
               .iter()
               .map(|(typ, p)| (typ.clone(), p.omni, p.service.clone().filter(|s| !s.is_empty())))
               .collect();
        for (typ, omni, service) in processes {
            if omni {
                job.omni.insert(typ.clone());
            }
            match service {
                None => {
                    debug!("deployment {}: using job events for {typ}", job.deployment.id);
                    job.use_job_events.insert(typ);
                }
                Some(service) => {
                    debug!("deployment {}: using service discovery for {typ} ({service})", job.deployment.id);
                    job.watch_service(&typ, &service).await?;
                    job.service_names.insert(typ, service);
                }
            }
        }

        let jobs_rx = job.ctx.backend.subscribe_jobs(app_id).await?;
        job.forward_jobs(jobs_rx);

        for j in job.ctx.backend.list_jobs(app_id).await? {
            if j.state != JobState::Up || !job.use_job_events.contains(&j.process_type) {
                continue;
            }
            // descarta los eventos recibidos entre abrir el stream y listar
            job.known_job_states.insert((j.id.clone(), JobState::Up));
            job.count_up(j.release_id, &j.process_type);
        }

        info!("deployment {} state: processes={:?} old={:?} new={:?}",
              job.deployment.id, job.deployment.processes, job.old_state, job.new_state);
        Ok(job)
    }

    fn count_up(&mut self, release_id: Uuid, typ: &str) {
        if Some(release_id) == self.deployment.old_release_id {
            *self.old_state.entry(typ.to_string()).or_insert(0) += 1;
        } else if release_id == self.deployment.new_release_id {
            *self.new_state.entry(typ.to_string()).or_insert(0) += 1;
        }
    }

    async fn watch_service(&mut self, typ: &str, service: &str) -> Result<(), CoreError> {
        let mut rx = self.ctx.discovery.watch(service).await?;
        let deadline = Instant::now() + DISCOVERY_CURRENT_TIMEOUT;
        let unavailable = || CoreError::backend(format!("deployer: could not create watcher for service: {service}"));
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CoreError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(unavailable()),
                ev = rx.recv() => ev.ok_or_else(unavailable)?,
            };
            match event.kind {
                DiscoveryEventKind::Current => break,
                DiscoveryEventKind::ServiceMeta => self.service_meta = event.service_meta,
                DiscoveryEventKind::Up => {
                    if let Some(release_id) = event.instance.as_ref().and_then(|i| i.release_id()) {
                        self.count_up(release_id, typ);
                    }
                }
                _ => {}
            }
        }

        let tx = self.observed_tx.clone();
        let app_id = self.deployment.app_id;
        self.tasks.push(tokio::spawn(async move {
                           while let Some(event) = rx.recv().await {
                               let Some(inst) = &event.instance else { continue };
                               if inst.app_id() != Some(app_id) || inst.release_id().is_none() {
                                   continue;
                               }
                               if tx.send(Observed::Discovery(event)).await.is_err() {
                                   return;
                               }
                           }
                           let _ = tx.send(Observed::Error("unexpected close of service event stream".into())).await;
                       }));
        Ok(())
    }

    fn forward_jobs(&mut self, mut rx: mpsc::Receiver<Job>) {
        let tx = self.observed_tx.clone();
        self.tasks.push(tokio::spawn(async move {
                           while let Some(job) = rx.recv().await {
                               if tx.send(Observed::Job(job)).await.is_err() {
                                   return;
                               }
                           }
                           let _ = tx.send(Observed::Error("unexpected close of job event stream".into())).await;
                       }));
    }

    pub(super) fn is_omni(&self, typ: &str) -> bool { self.omni.contains(typ) }

    /// Instancias que produce un contador de formation para `typ`.
    pub(super) fn instances_per_unit(&self, typ: &str) -> i32 {
        if self.is_omni(typ) {
            self.host_count.max(1)
        } else {
            1
        }
    }

    pub fn deployment(&self) -> &Deployment { &self.deployment }

    /// Publica un evento de progreso. Los fallos se registran y no abortan.
    pub(super) async fn emit(&self, mut event: DeploymentEvent) {
        event.app_id = self.deployment.app_id;
        event.deployment_id = self.deployment.id;
        if let Err(e) = self.ctx.backend.record_event(event).await {
            warn!("deployment {}: error recording deployment event: {e}", self.deployment.id);
        }
    }

    pub(super) async fn put_new_formation(&self) -> Result<(), CoreError> { self.ctx.backend.put_formation(&self.new_formation).await }

    pub(super) async fn put_old_formation(&self) -> Result<(), CoreError> {
        if self.deployment.old_release_id.is_none() {
            return Ok(());
        }
        self.ctx.backend.put_formation(&self.old_formation).await
    }

    /// Siguiente evento para `release`, o `None` si vence `deadline`.
    async fn recv_for(&mut self, release: Uuid, deadline: Instant) -> Result<Option<Observed>, CoreError> {
        if let Some(ev) = self.pending.get_mut(&release).and_then(VecDeque::pop_front) {
            return Ok(Some(ev));
        }
        loop {
            let ev = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CoreError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
                ev = self.observed_rx.recv() => ev,
            };
            let Some(ev) = ev else {
                return Err(CoreError::backend("deployer: event streams closed"));
            };
            match ev.release_id() {
                None => return Ok(Some(ev)),
                Some(r) if r == release => return Ok(Some(ev)),
                Some(r) => self.pending.entry(r).or_default().push_back(ev),
            }
        }
    }

    /// Acumula eventos de `release` hasta que los conteos coinciden con
    /// `expected`. Publica un `DeploymentEvent` por cada evento contado.
    pub(super) async fn wait_for_job_events(&mut self, release: Uuid, expected: &JobEvents) -> Result<(), CoreError> {
        if expected.is_empty() {
            return Ok(());
        }
        info!("deployment {}: waiting for job events {expected:?} release={release}", self.deployment.id);
        let deadline = Instant::now() + self.step_timeout;
        let mut actual = JobEvents::new();
        loop {
            let Some(observed) = self.recv_for(release, deadline).await? else {
                return Err(CoreError::Timeout(format!("waiting for job events: {expected:?}")));
            };
            match observed {
                Observed::Error(e) => return Err(CoreError::backend(e)),
                Observed::Discovery(event) => {
                    if !matches!(event.kind, DiscoveryEventKind::Up | DiscoveryEventKind::Update) {
                        continue;
                    }
                    let Some(inst) = event.instance else { continue };
                    let Some(typ) = inst.process_type().map(str::to_string) else { continue };
                    if self.use_job_events.contains(&typ) {
                        continue;
                    }
                    let Some(job_id) = inst.job_id().map(str::to_string) else { continue };
                    debug!("deployment {}: service event job={job_id} type={typ} kind={:?}", self.deployment.id, event.kind);
                    self.count_event(release, &mut actual, &job_id, &typ, JobState::Up).await;
                }
                Observed::Job(job) => {
                    let typ = job.process_type.clone();
                    let expecting_up = expected.get(&typ).and_then(|s| s.get(&JobState::Up)).copied().unwrap_or(0) > 0;
                    if !self.use_job_events.contains(&typ) {
                        // el "up" de los tipos con servicio llega por discovery
                        if job.state == JobState::Up {
                            continue;
                        }
                        if expecting_up && job.is_down() {
                            self.count_event(release, &mut actual, &job.id, &typ, JobState::Down).await;
                            return Err(CoreError::backend(format!("{typ} process type failed to start, got {} job event", job.state)));
                        }
                    }
                    debug!("deployment {}: job event job={} type={typ} state={}", self.deployment.id, job.id, job.state);
                    if job.state == JobState::Starting {
                        continue;
                    }
                    self.count_event(release, &mut actual, &job.id, &typ, job.state).await;
                    if let Some(err) = &job.host_error {
                        return Err(CoreError::backend(format!("deployer: {typ} job failed to start: {err}")));
                    }
                    if expecting_up && job.state == JobState::Failed {
                        return Err(CoreError::backend(format!("deployer: {typ} job failed")));
                    }
                }
            }
            if satisfied(expected, &actual) {
                return Ok(());
            }
        }
    }

    async fn count_event(&mut self, release: Uuid, actual: &mut JobEvents, job_id: &str, typ: &str, state: JobState) {
        if state == JobState::Pending {
            return;
        }
        if !self.known_job_states.insert((job_id.to_string(), state)) {
            return;
        }
        *actual.entry(typ.to_string()).or_default().entry(state).or_insert(0) += 1;
        self.emit(DeploymentEvent::job(release, typ, state)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfied_only_checks_expected_keys() {
        let mut expected = JobEvents::new();
        expect(&mut expected, "web", JobState::Up, 2);
        let mut actual = JobEvents::new();
        expect(&mut actual, "web", JobState::Up, 2);
        expect(&mut actual, "web", JobState::Down, 1);
        expect(&mut actual, "worker", JobState::Up, 5);
        assert!(satisfied(&expected, &actual));
        expect(&mut actual, "web", JobState::Up, 1);
        assert!(!satisfied(&expected, &actual));
    }

    #[test]
    fn missing_type_is_not_satisfied() {
        let mut expected = JobEvents::new();
        expect(&mut expected, "web", JobState::Up, 1);
        assert!(!satisfied(&expected, &JobEvents::new()));
    }

    #[test]
    fn expect_ignores_non_positive_counts() {
        let mut expected = JobEvents::new();
        expect(&mut expected, "web", JobState::Up, 0);
        assert!(expected.is_empty());
    }
}
