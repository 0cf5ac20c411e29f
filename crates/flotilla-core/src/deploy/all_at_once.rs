use flotilla_domain::JobState;
use log::info;

use super::job::{expect, DeployJob, JobEvents};
use crate::errors::CoreError;

impl DeployJob {
    /// Sube el release nuevo a los contadores objetivo de una vez, espera
    /// todos los "up" y después baja el release viejo a cero.
    pub(super) async fn deploy_all_at_once(&mut self) -> Result<(), CoreError> {
        info!("deployment {}: starting all-at-once deployment", self.deployment.id);

        let mut expected = JobEvents::new();
        let targets: Vec<(String, i32)> = self.deployment.processes.iter().map(|(t, n)| (t.clone(), *n)).collect();
        for (typ, n) in &targets {
            let want = n * self.instances_per_unit(typ);
            let have = self.new_state.get(typ).copied().unwrap_or(0);
            expect(&mut expected, typ, JobState::Up, want - have);
            self.new_formation.processes.insert(typ.clone(), *n);
        }
        if !expected.is_empty() {
            self.put_new_formation().await?;
            let release = self.deployment.new_release_id;
            self.wait_for_job_events(release, &expected).await?;
        }

        self.scale_old_release_down().await
    }

    /// Pone a cero todos los tipos del release viejo y espera los "down" de
    /// las instancias que seguían arriba.
    pub(super) async fn scale_old_release_down(&mut self) -> Result<(), CoreError> {
        let Some(old_release) = self.deployment.old_release_id else {
            return Ok(());
        };
        let mut expected = JobEvents::new();
        for (typ, n) in &self.old_state {
            expect(&mut expected, typ, JobState::Down, *n);
        }
        for count in self.old_formation.processes.values_mut() {
            *count = 0;
        }
        info!("deployment {}: scaling old release {old_release} to zero", self.deployment.id);
        self.put_old_formation().await?;
        self.wait_for_job_events(old_release, &expected).await?;
        self.old_state.clear();
        Ok(())
    }
}
