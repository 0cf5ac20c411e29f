use std::collections::BTreeSet;

use flotilla_domain::{DeploymentEvent, JobState};
use log::info;

use super::job::{expect, DeployJob, JobEvents};
use crate::errors::CoreError;

impl DeployJob {
    /// Reemplaza instancias de una en una por tipo de proceso: +1 nuevo,
    /// espera "up", -1 viejo, espera "down". Nunca hay más de una instancia
    /// por encima del objetivo. Los tipos omni avanzan de a un contador
    /// (una instancia por host).
    pub(super) async fn deploy_one_by_one(&mut self) -> Result<(), CoreError> {
        info!("deployment {}: starting one-by-one deployment", self.deployment.id);

        let types: BTreeSet<String> = self.deployment
                                          .processes
                                          .keys()
                                          .chain(self.old_formation.processes.keys())
                                          .cloned()
                                          .collect();
        let new_release = self.deployment.new_release_id;
        let old_release = self.deployment.old_release_id;

        for typ in types {
            let unit = self.instances_per_unit(&typ);
            let target = self.deployment.processes.get(&typ).copied().unwrap_or(0);
            let mut new_count = self.new_state.get(&typ).copied().unwrap_or(0) / unit;
            let mut old_count = self.old_formation.count(&typ);

            while new_count < target {
                new_count += 1;
                self.new_formation.processes.insert(typ.clone(), new_count);
                self.put_new_formation().await?;
                self.emit(DeploymentEvent::job(new_release, &typ, JobState::Starting)).await;
                let mut expected = JobEvents::new();
                expect(&mut expected, &typ, JobState::Up, unit);
                self.wait_for_job_events(new_release, &expected).await?;

                if old_count > 0 {
                    if let Some(old) = old_release {
                        old_count -= 1;
                        self.stop_one_old(old, &typ, old_count, unit).await?;
                    }
                }
            }
            // el objetivo nuevo puede ser menor que lo que corría antes
            while old_count > 0 {
                let Some(old) = old_release else { break };
                old_count -= 1;
                self.stop_one_old(old, &typ, old_count, unit).await?;
            }
            if !self.new_formation.processes.contains_key(&typ) && self.deployment.processes.contains_key(&typ) {
                self.new_formation.processes.insert(typ.clone(), target);
                self.put_new_formation().await?;
            }
        }
        Ok(())
    }

    async fn stop_one_old(&mut self, old: uuid::Uuid, typ: &str, count: i32, unit: i32) -> Result<(), CoreError> {
        self.old_formation.processes.insert(typ.to_string(), count);
        self.put_old_formation().await?;
        self.emit(DeploymentEvent::job(old, typ, JobState::Stopping)).await;
        let mut expected = JobEvents::new();
        expect(&mut expected, typ, JobState::Down, unit);
        self.wait_for_job_events(old, &expected).await?;
        if let Some(n) = self.old_state.get_mut(typ) {
            *n = (*n - unit).max(0);
        }
        Ok(())
    }
}
