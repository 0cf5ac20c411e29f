//! Estrategia para clusters con estado replicados en cadena
//! (primary → sync → async...).
//!
//! Cada nodo viejo se reemplaza así: se arranca una instancia nueva (entra
//! por la cola de la cadena), se para la vieja y se espera a que el nodo que
//! quedó detrás del hueco alcance a su nuevo upstream. El orden es asyncs
//! de cola a cabeza, luego el sync y por último el primary, de modo que el
//! primary sólo cambia cuando ya hay dos réplicas nuevas sincronizadas.
use flotilla_domain::{DeploymentEvent, JobState};
use log::{error, info};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::backend::{DiscoveryEvent, DiscoveryEventKind, Instance, SireniaState};
use super::job::{expect, DeployJob, JobEvents};
use crate::constants::REPL_SYNC_TIMEOUT;
use crate::errors::CoreError;

pub const SIRENIA_PROCESS_ENV: &str = "SIRENIA_PROCESS";

fn fail(msg: impl Into<String>) -> CoreError {
    let msg = msg.into();
    error!("sirenia deployment: {msg}");
    CoreError::backend(msg)
}

impl DeployJob {
    fn sirenia_process_type(&self) -> Option<String> {
        self.old_release
            .as_ref()
            .and_then(|r| r.env.get(SIRENIA_PROCESS_ENV))
            .filter(|s| !s.is_empty())
            .or_else(|| self.new_release.env.get(SIRENIA_PROCESS_ENV).filter(|s| !s.is_empty()))
            .cloned()
    }

    async fn next_discovery(&self,
                            rx: &mut mpsc::Receiver<DiscoveryEvent>,
                            deadline: Instant,
                            waiting_for: &str)
                            -> Result<DiscoveryEvent, CoreError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CoreError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(CoreError::Timeout(format!("waiting for {waiting_for}"))),
            ev = rx.recv() => ev.ok_or_else(|| fail("service event stream closed unexpectedly")),
        }
    }

    pub(super) async fn deploy_sirenia(&mut self) -> Result<(), CoreError> {
        info!("deployment {}: starting sirenia deployment", self.deployment.id);

        let process_type = self.sirenia_process_type()
                               .ok_or_else(|| fail("unable to determine sirenia process type"))?;
        let service = self.new_release
                          .processes
                          .get(&process_type)
                          .ok_or_else(|| fail("sirenia process type not present in new release"))?
                          .service
                          .clone();
        let target = self.deployment.processes.get(&process_type).copied().unwrap_or(0);
        if target == 0 {
            info!("deployment {}: sirenia process type scale = 0, skipping", self.deployment.id);
            return self.deploy_one_by_one().await;
        }
        let service = service.filter(|s| !s.is_empty())
                             .ok_or_else(|| fail("sirenia process type has no service"))?;

        let mut events = self.ctx.discovery.watch(&service).await?;
        let deadline = Instant::now() + self.step_timeout;
        let mut meta = None;
        loop {
            let event = self.next_discovery(&mut events, deadline, "current service event").await?;
            match event.kind {
                DiscoveryEventKind::Current => break,
                DiscoveryEventKind::ServiceMeta => meta = event.service_meta,
                DiscoveryEventKind::Up => {
                    if event.instance.as_ref().and_then(Instance::release_id) == Some(self.deployment.new_release_id) {
                        return Err(fail("sirenia cluster in unexpected state"));
                    }
                }
                _ => {}
            }
        }
        let meta = meta.ok_or_else(|| fail("missing sirenia cluster state"))?;
        let state: SireniaState = serde_json::from_value(meta.data).map_err(|e| fail(format!("invalid sirenia cluster state: {e}")))?;

        if state.singleton {
            return Err(fail("sirenia cluster in singleton mode"));
        }
        if state.asyncs.is_empty() {
            return Err(fail("sirenia cluster in unhealthy state (has no asyncs)"));
        }
        if (state.asyncs.len() as i32) < target - 2 {
            return Err(fail("sirenia cluster in unhealthy state (too few asyncs)"));
        }
        let primary = state.primary.ok_or_else(|| fail("sirenia cluster has no primary"))?;
        let sync = state.sync.ok_or_else(|| fail("sirenia cluster has no sync"))?;

        let mut order: Vec<Instance> = state.asyncs.iter().rev().cloned().collect();
        order.push(sync.clone());
        order.push(primary.clone());
        let mut chain: Vec<Instance> = vec![primary, sync];
        chain.extend(state.asyncs);

        for old in order {
            self.replace_peer(&mut events, &process_type, &mut chain, &old).await?;
        }

        info!("deployment {}: stopping old {process_type} jobs", self.deployment.id);
        self.old_formation.processes.insert(process_type.clone(), 0);
        self.put_old_formation().await?;
        if let Some(old_release) = self.deployment.old_release_id {
            let mut expected = JobEvents::new();
            expect(&mut expected, &process_type, JobState::Down, self.old_state.remove(&process_type).unwrap_or(0));
            self.wait_for_job_events(old_release, &expected).await?;
        }
        self.new_state.insert(process_type, target);

        self.deploy_one_by_one().await
    }

    async fn replace_peer(&mut self,
                          events: &mut mpsc::Receiver<DiscoveryEvent>,
                          process_type: &str,
                          chain: &mut Vec<Instance>,
                          old: &Instance)
                          -> Result<(), CoreError> {
        info!("deployment {}: replacing sirenia peer {} ({})", self.deployment.id, old.id, old.addr);
        let new = self.start_peer(events, process_type).await?;
        chain.push(new);
        self.stop_peer(events, process_type, old).await?;

        let idx = chain.iter()
                       .position(|i| i.id == old.id)
                       .ok_or_else(|| fail(format!("peer {} missing from cluster chain", old.id)))?;
        chain.remove(idx);

        if idx == 0 {
            info!("deployment {}: waiting for read-write on {}", self.deployment.id, chain[0].addr);
            self.ctx.sirenia.wait_for_read_write(&chain[0].addr, REPL_SYNC_TIMEOUT).await?;
        } else if idx < chain.len() {
            self.wait_for_sync(&chain[idx - 1], &chain[idx]).await?;
        }
        let tail = chain.len() - 1;
        if tail >= 1 && tail != idx {
            self.wait_for_sync(&chain[tail - 1], &chain[tail]).await?;
        }
        Ok(())
    }

    async fn wait_for_sync(&self, upstream: &Instance, downstream: &Instance) -> Result<(), CoreError> {
        info!("deployment {}: waiting for replication sync {} -> {}", self.deployment.id, upstream.addr, downstream.addr);
        self.ctx.sirenia.wait_for_repl_sync(upstream, downstream, REPL_SYNC_TIMEOUT).await
    }

    async fn start_peer(&mut self, events: &mut mpsc::Receiver<DiscoveryEvent>, process_type: &str) -> Result<Instance, CoreError> {
        let new_release = self.deployment.new_release_id;
        self.emit(DeploymentEvent::job(new_release, process_type, JobState::Starting)).await;
        let count = self.new_formation.count(process_type) + 1;
        self.new_formation.processes.insert(process_type.to_string(), count);
        self.put_new_formation().await?;

        let deadline = Instant::now() + self.step_timeout;
        loop {
            let event = self.next_discovery(events, deadline, "new instance to come up").await?;
            if event.kind != DiscoveryEventKind::Up {
                continue;
            }
            let Some(inst) = event.instance else { continue };
            if inst.release_id() == Some(new_release) && inst.process_type() == Some(process_type) {
                self.emit(DeploymentEvent::job(new_release, process_type, JobState::Up)).await;
                return Ok(inst);
            }
        }
    }

    async fn stop_peer(&mut self, events: &mut mpsc::Receiver<DiscoveryEvent>, process_type: &str, inst: &Instance) -> Result<(), CoreError> {
        let old_release = self.deployment.old_release_id.unwrap_or(self.deployment.new_release_id);
        self.emit(DeploymentEvent::job(old_release, process_type, JobState::Stopping)).await;
        self.ctx.sirenia.stop(&inst.addr).await?;

        let deadline = Instant::now() + self.step_timeout;
        loop {
            let event = self.next_discovery(events, deadline, "peer to stop").await?;
            if event.kind == DiscoveryEventKind::Down && event.instance.as_ref().map(|i| i.id.as_str()) == Some(inst.id.as_str()) {
                self.emit(DeploymentEvent::job(old_release, process_type, JobState::Down)).await;
                return Ok(());
            }
        }
    }
}
