//! Worker de la clase `domain_migration`.
//!
//! Para cada ruta HTTP de una app bajo el dominio viejo se crea su gemela
//! bajo el dominio nuevo, salvo que ya exista. Las rutas viejas se
//! conservan. Al terminar se marca la migración y se emite el evento.

use async_trait::async_trait;
use flotilla_adapters::RouterClient;
use flotilla_core::{JobError, JobHandler, QueueJob};
use flotilla_domain::{DomainMigration, Route};
use flotilla_persistence::{DomainMigrationJobArgs, DomainMigrationRepo};
use log::info;

use crate::error::{InfraError, Result};

const APP_PARENT_PREFIX: &str = "apps/";

fn has_route(routes: &[Route], parent: &str, domain: &str, path: Option<&str>) -> bool {
    routes.iter()
          .any(|r| r.parent_ref == parent && r.domain.as_deref() == Some(domain) && r.path.as_deref() == path)
}

/// Rutas que faltan bajo el dominio nuevo, sin id.
pub fn missing_routes(dm: &DomainMigration, routes: &[Route]) -> Vec<Route> {
    let mut out: Vec<Route> = Vec::new();
    for route in routes.iter().filter(|r| r.route_type == "http" && r.parent_ref.starts_with(APP_PARENT_PREFIX)) {
        let Some(new_domain) = route.domain.as_deref().and_then(|d| dm.migrate_route_domain(d)) else {
            continue;
        };
        let path = route.path.as_deref();
        if has_route(routes, &route.parent_ref, &new_domain, path) || has_route(&out, &route.parent_ref, &new_domain, path) {
            continue;
        }
        out.push(Route { route_type: route.route_type.clone(),
                         parent_ref: route.parent_ref.clone(),
                         service: route.service.clone(),
                         leader: route.leader,
                         drain_backends: route.drain_backends,
                         domain: Some(new_domain),
                         path: route.path.clone(),
                         sticky: route.sticky,
                         ..Route::default() });
    }
    out
}

pub struct DomainMigrationHandler {
    migrations: DomainMigrationRepo,
    router: RouterClient,
}

impl DomainMigrationHandler {
    pub fn new(migrations: DomainMigrationRepo, router: RouterClient) -> Self { Self { migrations, router } }

    async fn migrate(&self, args: DomainMigrationJobArgs) -> Result<()> {
        let dm = self.migrations.get(args.id).await?;
        if dm.finished_at.is_some() {
            info!("domain_migration:skip id={} already finished", dm.id);
            return Ok(());
        }
        let routes = self.router.list_routes("").await?;
        let missing = missing_routes(&dm, &routes);
        info!("domain_migration:start id={} old={} new={} routes={} missing={}",
              dm.id,
              dm.old_domain,
              dm.domain,
              routes.len(),
              missing.len());
        for route in &missing {
            self.router.create_route(route).await?;
        }
        self.migrations.finish(dm.id).await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for DomainMigrationHandler {
    async fn run(&self, job: &QueueJob) -> std::result::Result<(), JobError> {
        let args: DomainMigrationJobArgs = job.decode_args()?;
        self.migrate(args).await.map_err(|e: InfraError| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration() -> DomainMigration {
        DomainMigration { old_domain: "old.test".into(),
                          domain: "new.test".into(),
                          ..DomainMigration::default() }
    }

    fn http(parent: &str, domain: &str) -> Route {
        Route { route_type: "http".into(),
                id: format!("http/{domain}"),
                parent_ref: parent.into(),
                service: "web".into(),
                domain: Some(domain.into()),
                sticky: true,
                ..Route::default() }
    }

    #[test]
    fn copies_default_domain_routes_once() {
        let routes = vec![http("apps/a", "a.old.test"), http("apps/b", "b.old.test"), http("apps/b", "b.new.test")];
        let missing = missing_routes(&migration(), &routes);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].domain.as_deref(), Some("a.new.test"));
        assert_eq!(missing[0].parent_ref, "apps/a");
        assert!(missing[0].sticky);
        assert!(missing[0].id.is_empty());
    }

    #[test]
    fn ignores_custom_domains_tcp_and_foreign_parents() {
        let tcp = Route { route_type: "tcp".into(),
                          parent_ref: "apps/a".into(),
                          service: "db".into(),
                          port: Some(5432),
                          ..Route::default() };
        let routes = vec![http("apps/a", "www.example.com"), http("system/router", "x.old.test"), tcp];
        assert!(missing_routes(&migration(), &routes).is_empty());
    }
}
