//! Servicio gRPC `flotilla.controller.v1.Controller`.
//!
//! Usa los mismos repositorios que la superficie HTTP. Los recursos se
//! nombran por ruta: `apps/<id>`, `apps/<id>/releases/<id>`,
//! `apps/<id>/releases/<id>/scales/<id>` y `apps/<id>/deployments/<id>`.
//!
//! Los streams envían una página inicial con `page_complete` y, si el
//! cliente pidió creaciones o actualizaciones, siguen con un mensaje por
//! cada evento que pase los filtros.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use async_stream::stream;
use chrono::{DateTime, Utc};
use flotilla_core::{EventFilter, EventSource, EventSubscriber};
use flotilla_domain::formation::validate_processes;
use flotilla_domain::{self as domain, DeploymentStrategy, EventOp, EventType, LabelFilter, LabelFilterExpression, LabelFilterOp,
                      ProcessType};
use flotilla_persistence::{AppUpdate, PageToken};
use futures::Stream;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::deployments::{deploy_and_subscribe, next_deployment_event, DeployBody};
use crate::routes::{lookup_app, release_for_app};
use crate::state::ApiState;

pub mod proto {
    tonic::include_proto!("flotilla.controller.v1");
}

use proto::controller_server::{Controller as ControllerRpc, ControllerServer};

type RpcStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct ControllerService {
    state: ApiState,
}

impl ControllerService {
    pub fn new(state: ApiState) -> Self { Self { state } }
}

pub fn server(state: ApiState) -> ControllerServer<ControllerService> { ControllerServer::new(ControllerService::new(state)) }

// nombres de recurso

fn app_name(id: Uuid) -> String { format!("apps/{id}") }

fn release_name(release: &domain::Release) -> String {
    match release.app_id {
        Some(app) => format!("apps/{app}/releases/{}", release.id),
        None => format!("releases/{}", release.id),
    }
}

fn scale_parent(req: &domain::ScaleRequest) -> String { format!("apps/{}/releases/{}", req.app_id, req.release_id) }

fn deployment_name(d: &domain::Deployment) -> String { format!("apps/{}/deployments/{}", d.app_id, d.id) }

/// Segmento que sigue a `collection` en un nombre de recurso.
fn name_segment<'a>(name: &'a str, collection: &str) -> Option<&'a str> {
    let mut parts = name.split('/');
    while let Some(part) = parts.next() {
        if part == collection {
            return parts.next().filter(|s| !s.is_empty());
        }
    }
    None
}

fn required_segment<'a>(name: &'a str, collection: &str) -> Result<&'a str, ApiError> {
    name_segment(name, collection).ok_or_else(|| ApiError::validation("name", format!("{name:?} does not name a {collection} resource")))
}

/// Vacío acepta todo; si no, el nombre debe ser igual a un filtro o estar
/// debajo de él.
fn name_matches(name: &str, filters: &[String]) -> bool {
    filters.is_empty()
    || filters.iter().any(|f| name == f || name.strip_prefix(f.as_str()).is_some_and(|rest| rest.starts_with('/')))
}

fn app_matches(app: &domain::App, filters: &[String]) -> bool {
    name_matches(&app_name(app.id), filters) || name_matches(&format!("apps/{}", app.name), filters)
}

// paginación en memoria para las colecciones sin cursor propio

fn page_size(size: i32) -> usize {
    if size > 0 {
        size as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

fn paginate<T>(items: Vec<T>, size: i32, token: &str) -> Result<(Vec<T>, String), ApiError> {
    let offset = match token {
        "" => 0,
        t => t.parse::<usize>().map_err(|_| ApiError::validation("page_token", "is invalid"))?,
    };
    let size = page_size(size);
    let total = items.len();
    let page = items.into_iter().skip(offset).take(size).collect();
    let end = offset.saturating_add(size);
    let next = if end < total { end.to_string() } else { String::new() };
    Ok((page, next))
}

// conversiones

fn timestamp(t: Option<DateTime<Utc>>) -> String { t.map(|t| t.to_rfc3339()).unwrap_or_default() }

fn to_hash<V: Clone>(m: &BTreeMap<String, V>) -> HashMap<String, V> { m.iter().map(|(k, v)| (k.clone(), v.clone())).collect() }

fn to_btree<V>(m: HashMap<String, V>) -> BTreeMap<String, V> { m.into_iter().collect() }

fn tags_to_proto(tags: &domain::Tags) -> HashMap<String, proto::DeploymentProcessTags> {
    tags.iter().map(|(k, v)| (k.clone(), proto::DeploymentProcessTags { tags: to_hash(v) })).collect()
}

fn tags_from_proto(tags: HashMap<String, proto::DeploymentProcessTags>) -> domain::Tags {
    tags.into_iter().map(|(k, v)| (k, to_btree(v.tags))).collect()
}

fn app_to_proto(app: &domain::App) -> proto::App {
    proto::App { name: app_name(app.id),
                 display_name: app.name.clone(),
                 labels: to_hash(&app.meta),
                 strategy: app.strategy.as_str().to_string(),
                 release: app.release_id.map(|r| format!("apps/{}/releases/{r}", app.id)).unwrap_or_default(),
                 deploy_timeout: app.deploy_timeout,
                 create_time: timestamp(app.created_at),
                 update_time: timestamp(app.updated_at) }
}

fn release_type_to_proto(t: domain::ReleaseType) -> proto::ReleaseType {
    match t {
        domain::ReleaseType::Code => proto::ReleaseType::Code,
        domain::ReleaseType::Config => proto::ReleaseType::Config,
    }
}

fn release_to_proto(release: &domain::Release) -> proto::Release {
    proto::Release { name: release_name(release),
                     artifacts: release.artifacts.iter().map(|a| format!("artifacts/{a}")).collect(),
                     env: to_hash(&release.env),
                     labels: to_hash(&release.meta),
                     processes_json: serde_json::to_string(&release.processes).unwrap_or_default(),
                     r#type: release_type_to_proto(release.release_type()) as i32,
                     create_time: timestamp(release.created_at) }
}

fn scale_state_to_proto(state: domain::ScaleRequestState) -> proto::ScaleRequestState {
    match state {
        domain::ScaleRequestState::Pending => proto::ScaleRequestState::Pending,
        domain::ScaleRequestState::Cancelled => proto::ScaleRequestState::Cancelled,
        domain::ScaleRequestState::Complete => proto::ScaleRequestState::Complete,
    }
}

fn scale_to_proto(req: &domain::ScaleRequest) -> proto::ScaleRequest {
    let parent = scale_parent(req);
    proto::ScaleRequest { name: format!("{parent}/scales/{}", req.id),
                          parent,
                          state: scale_state_to_proto(req.state) as i32,
                          old_processes: to_hash(&req.old_processes),
                          new_processes: req.new_processes.as_ref().map(to_hash).unwrap_or_default(),
                          old_tags: tags_to_proto(&req.old_tags),
                          new_tags: req.new_tags.as_ref().map(tags_to_proto).unwrap_or_default(),
                          create_time: timestamp(req.created_at),
                          update_time: timestamp(req.updated_at) }
}

fn status_to_proto(status: domain::DeploymentStatus) -> proto::DeploymentStatus {
    match status {
        domain::DeploymentStatus::Pending => proto::DeploymentStatus::Pending,
        domain::DeploymentStatus::Running => proto::DeploymentStatus::Running,
        domain::DeploymentStatus::Complete => proto::DeploymentStatus::Complete,
        domain::DeploymentStatus::Failed => proto::DeploymentStatus::Failed,
        domain::DeploymentStatus::Cancelled => proto::DeploymentStatus::Cancelled,
    }
}

fn deployment_to_proto(d: &domain::Deployment) -> proto::Deployment {
    proto::Deployment { name: deployment_name(d),
                        old_release: d.old_release_id.map(|r| format!("apps/{}/releases/{r}", d.app_id)).unwrap_or_default(),
                        new_release: format!("apps/{}/releases/{}", d.app_id, d.new_release_id),
                        strategy: d.strategy.as_str().to_string(),
                        status: status_to_proto(d.status) as i32,
                        processes: to_hash(&d.processes),
                        tags: tags_to_proto(&d.tags),
                        deploy_timeout: d.deploy_timeout,
                        create_time: timestamp(d.created_at),
                        end_time: timestamp(d.finished_at) }
}

fn deployment_event_to_proto(parent: &str, ev: &domain::DeploymentEvent, at: Option<DateTime<Utc>>) -> proto::DeploymentEvent {
    proto::DeploymentEvent { parent: parent.to_string(),
                             job_type: ev.job_type.clone().unwrap_or_default(),
                             job_state: ev.job_state.map(|s| s.to_string()).unwrap_or_default(),
                             error: ev.error.clone().unwrap_or_default(),
                             status: status_to_proto(ev.status) as i32,
                             create_time: timestamp(at) }
}

fn label_filters(filters: Vec<proto::LabelFilter>) -> Result<Vec<LabelFilter>, ApiError> {
    use proto::label_filter::expression::Operator;
    filters.into_iter()
           .map(|f| {
               let expressions = f.expressions
                                  .into_iter()
                                  .map(|e| {
                                      let op = match Operator::try_from(e.op) {
                                          Ok(Operator::In) => LabelFilterOp::In,
                                          Ok(Operator::NotIn) => LabelFilterOp::NotIn,
                                          Ok(Operator::Exists) => LabelFilterOp::Exists,
                                          Ok(Operator::NotExists) => LabelFilterOp::NotExists,
                                          Err(_) => return Err(ApiError::validation("label_filters", format!("unknown operator {}", e.op))),
                                      };
                                      Ok(LabelFilterExpression { key: e.key, op, values: e.values })
                                  })
                                  .collect::<Result<Vec<_>, _>>()?;
               Ok(LabelFilter { expressions })
           })
           .collect()
}

/// Un stream sigue vivo si el cliente pidió creaciones o actualizaciones.
#[derive(Debug, Clone, Copy)]
struct LiveMode {
    creates: bool,
    updates: bool,
}

impl LiveMode {
    fn enabled(&self) -> bool { self.creates || self.updates }

    fn wants(&self, created: bool) -> bool { if created { self.creates } else { self.updates } }
}

async fn subscribe_if(state: &ApiState, live: LiveMode, types: &[EventType]) -> Result<Option<EventSubscriber>, ApiError> {
    if !live.enabled() {
        return Ok(None);
    }
    Ok(Some(state.listener.subscribe(EventFilter::default().with_types(types)).await?))
}

#[tonic::async_trait]
impl ControllerRpc for ControllerService {
    type StreamAppsStream = RpcStream<proto::StreamAppsResponse>;
    type StreamReleasesStream = RpcStream<proto::StreamReleasesResponse>;
    type StreamScalesStream = RpcStream<proto::StreamScalesResponse>;
    type StreamDeploymentsStream = RpcStream<proto::StreamDeploymentsResponse>;
    type CreateDeploymentStream = RpcStream<proto::DeploymentEvent>;

    async fn stream_apps(&self, request: Request<proto::StreamAppsRequest>) -> Result<Response<Self::StreamAppsStream>, Status> {
        let req = request.into_inner();
        let labels = label_filters(req.label_filters)?;
        let live = LiveMode { creates: req.stream_creates, updates: req.stream_updates };
        let mut sub = subscribe_if(&self.state, live, &[EventType::App]).await?;

        let token = match req.page_token.as_str() {
            "" => None,
            t => Some(PageToken::decode(t).map_err(ApiError::from)?),
        };
        let page = self.state.apps.list_page(page_size(req.page_size) as i64, token).await.map_err(ApiError::from)?;
        let names = req.name_filters;
        let keep = move |app: &domain::App| app_matches(app, &names) && LabelFilter::matches_any(&labels, &app.meta);
        let first = proto::StreamAppsResponse { apps: page.items.iter().filter(|a| keep(a)).map(app_to_proto).collect(),
                                                page_complete: true,
                                                next_page_token: page.next.map(|t| t.encode()).unwrap_or_default() };
        Ok(Response::new(Box::pin(stream! {
            yield Ok(first);
            let Some(sub) = sub.as_mut() else { return };
            while let Some(event) = sub.next().await {
                if !live.wants(event.op == EventOp::Create) {
                    continue;
                }
                let Ok(app) = event.decode::<domain::App>() else { continue };
                if keep(&app) {
                    yield Ok(proto::StreamAppsResponse { apps: vec![app_to_proto(&app)], ..Default::default() });
                }
            }
            if let Some(err) = sub.err() {
                yield Err(Status::unavailable(err.to_string()));
            }
        }) as Self::StreamAppsStream))
    }

    async fn stream_releases(&self,
                             request: Request<proto::StreamReleasesRequest>)
                             -> Result<Response<Self::StreamReleasesStream>, Status> {
        let req = request.into_inner();
        let labels = label_filters(req.label_filters)?;
        let types: Vec<proto::ReleaseType> = req.type_filters
                                                .iter()
                                                .filter_map(|t| proto::ReleaseType::try_from(*t).ok())
                                                .filter(|t| *t != proto::ReleaseType::Any)
                                                .collect();
        let live = LiveMode { creates: req.stream_creates, updates: req.stream_updates };
        let mut sub = subscribe_if(&self.state, live, &[EventType::Release]).await?;

        let names = req.name_filters;
        let keep = move |r: &domain::Release| {
            name_matches(&release_name(r), &names)
            && LabelFilter::matches_any(&labels, &r.meta)
            && (types.is_empty() || types.contains(&release_type_to_proto(r.release_type())))
        };
        let all: Vec<_> = self.state.releases.list().await.map_err(ApiError::from)?.into_iter().filter(|r| keep(r)).collect();
        let (page, next) = paginate(all, req.page_size, &req.page_token)?;
        let first = proto::StreamReleasesResponse { releases: page.iter().map(release_to_proto).collect(),
                                                    page_complete: true,
                                                    next_page_token: next };
        Ok(Response::new(Box::pin(stream! {
            yield Ok(first);
            let Some(sub) = sub.as_mut() else { return };
            while let Some(event) = sub.next().await {
                if !live.wants(event.op == EventOp::Create) {
                    continue;
                }
                let Ok(release) = event.decode::<domain::Release>() else { continue };
                if keep(&release) {
                    yield Ok(proto::StreamReleasesResponse { releases: vec![release_to_proto(&release)], ..Default::default() });
                }
            }
            if let Some(err) = sub.err() {
                yield Err(Status::unavailable(err.to_string()));
            }
        }) as Self::StreamReleasesStream))
    }

    async fn stream_scales(&self, request: Request<proto::StreamScalesRequest>) -> Result<Response<Self::StreamScalesStream>, Status> {
        let req = request.into_inner();
        let states: Vec<i32> = req.state_filters.clone();
        let live = LiveMode { creates: req.stream_creates, updates: req.stream_updates };
        let mut sub = subscribe_if(&self.state, live, &[EventType::ScaleRequest, EventType::ScaleRequestCancelation]).await?;

        // el listado necesita al menos una app
        let apps = match req.name_filters.iter().filter_map(|n| name_segment(n, "apps")).collect::<Vec<_>>() {
            ids if ids.is_empty() => self.state.apps.list().await.map_err(ApiError::from)?,
            ids => {
                let mut apps = Vec::with_capacity(ids.len());
                for id in ids {
                    apps.push(lookup_app(&self.state, id).await?);
                }
                apps
            }
        };
        let names = req.name_filters;
        let keep = move |sr: &domain::ScaleRequest| {
            let name = format!("{}/scales/{}", scale_parent(sr), sr.id);
            name_matches(&name, &names) && (states.is_empty() || states.contains(&(scale_state_to_proto(sr.state) as i32)))
        };
        let mut all = Vec::new();
        for app in &apps {
            all.extend(self.state.scales.list(app.id).await.map_err(ApiError::from)?.into_iter().filter(|sr| keep(sr)));
        }
        let (page, next) = paginate(all, req.page_size, &req.page_token)?;
        let first = proto::StreamScalesResponse { scale_requests: page.iter().map(scale_to_proto).collect(),
                                                  page_complete: true,
                                                  next_page_token: next };
        Ok(Response::new(Box::pin(stream! {
            yield Ok(first);
            let Some(sub) = sub.as_mut() else { return };
            while let Some(event) = sub.next().await {
                let Ok(sr) = event.decode::<domain::ScaleRequest>() else { continue };
                if live.wants(!sr.is_finished()) && keep(&sr) {
                    yield Ok(proto::StreamScalesResponse { scale_requests: vec![scale_to_proto(&sr)], ..Default::default() });
                }
            }
            if let Some(err) = sub.err() {
                yield Err(Status::unavailable(err.to_string()));
            }
        }) as Self::StreamScalesStream))
    }

    async fn stream_deployments(&self,
                                request: Request<proto::StreamDeploymentsRequest>)
                                -> Result<Response<Self::StreamDeploymentsStream>, Status> {
        let req = request.into_inner();
        let statuses: Vec<i32> = req.status_filters.clone();
        let live = LiveMode { creates: req.stream_creates, updates: req.stream_updates };
        let mut sub = subscribe_if(&self.state, live, &[EventType::Deployment]).await?;

        let apps = match req.name_filters.iter().filter_map(|n| name_segment(n, "apps")).collect::<Vec<_>>() {
            ids if ids.is_empty() => self.state.apps.list().await.map_err(ApiError::from)?,
            ids => {
                let mut apps = Vec::with_capacity(ids.len());
                for id in ids {
                    apps.push(lookup_app(&self.state, id).await?);
                }
                apps
            }
        };
        let names = req.name_filters;
        let keep = move |d: &domain::Deployment| {
            name_matches(&deployment_name(d), &names)
            && (statuses.is_empty() || statuses.contains(&(status_to_proto(d.status) as i32)))
        };
        let mut all = Vec::new();
        for app in &apps {
            all.extend(self.state.deployments.list(app.id).await.map_err(ApiError::from)?.into_iter().filter(|d| keep(d)));
        }
        let (page, next) = paginate(all, req.page_size, &req.page_token)?;
        let first = proto::StreamDeploymentsResponse { deployments: page.iter().map(deployment_to_proto).collect(),
                                                       page_complete: true,
                                                       next_page_token: next };
        let state = self.state.clone();
        Ok(Response::new(Box::pin(stream! {
            yield Ok(first);
            let Some(sub) = sub.as_mut() else { return };
            while let Some(event) = sub.next().await {
                let Ok(ev) = event.decode::<domain::DeploymentEvent>() else { continue };
                if !live.wants(ev.status == domain::DeploymentStatus::Pending && ev.job_type.is_none()) {
                    continue;
                }
                match state.deployments.get(ev.deployment_id).await {
                    Ok(d) if keep(&d) => {
                        yield Ok(proto::StreamDeploymentsResponse { deployments: vec![deployment_to_proto(&d)], ..Default::default() });
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(deployment_id = %ev.deployment_id, error = %e, "deployment lookup failed"),
                }
            }
            if let Some(err) = sub.err() {
                yield Err(Status::unavailable(err.to_string()));
            }
        }) as Self::StreamDeploymentsStream))
    }

    async fn create_app(&self, request: Request<proto::CreateAppRequest>) -> Result<Response<proto::App>, Status> {
        let msg = request.into_inner().app.unwrap_or_default();
        let mut app = domain::App { name: msg.display_name,
                                    meta: to_btree(msg.labels),
                                    deploy_timeout: msg.deploy_timeout,
                                    ..domain::App::default() };
        if !msg.strategy.is_empty() {
            app.strategy = msg.strategy.parse::<DeploymentStrategy>().map_err(ApiError::from)?;
        }
        let app = self.state.apps.add(app).await.map_err(ApiError::from)?;
        tracing::info!(app_id = %app.id, name = %app.name, "app created via grpc");
        Ok(Response::new(app_to_proto(&app)))
    }

    async fn update_app(&self, request: Request<proto::UpdateAppRequest>) -> Result<Response<proto::App>, Status> {
        let msg = request.into_inner().app.unwrap_or_default();
        let app = lookup_app(&self.state, required_segment(&msg.name, "apps")?).await?;
        let strategy = match msg.strategy.as_str() {
            "" => None,
            s => Some(s.parse::<DeploymentStrategy>().map_err(ApiError::from)?),
        };
        let update = AppUpdate { meta: (!msg.labels.is_empty()).then(|| to_btree(msg.labels)),
                                 strategy,
                                 deploy_timeout: (msg.deploy_timeout > 0).then_some(msg.deploy_timeout) };
        let mut app = self.state.apps.update(app.id, update).await.map_err(ApiError::from)?;
        if !msg.release.is_empty() {
            let release = release_for_app(&self.state, &app, required_segment(&msg.release, "releases")?).await?;
            app = self.state.apps.set_release(app.id, release.id).await.map_err(ApiError::from)?;
        }
        Ok(Response::new(app_to_proto(&app)))
    }

    async fn create_release(&self, request: Request<proto::CreateReleaseRequest>) -> Result<Response<proto::Release>, Status> {
        let req = request.into_inner();
        let app = lookup_app(&self.state, required_segment(&req.parent, "apps")?).await?;
        let msg = req.release.unwrap_or_default();
        let artifacts = msg.artifacts
                           .iter()
                           .map(|a| {
                               let id = name_segment(a, "artifacts").unwrap_or(a);
                               Uuid::parse_str(id).map_err(|_| ApiError::validation("artifacts", format!("invalid artifact {a:?}")))
                           })
                           .collect::<Result<Vec<_>, _>>()?;
        let processes: BTreeMap<String, ProcessType> = match msg.processes_json.as_str() {
            "" => BTreeMap::new(),
            json => serde_json::from_str(json).map_err(ApiError::from)?,
        };
        let release = domain::Release { app_id: Some(app.id),
                                        artifacts,
                                        env: to_btree(msg.env),
                                        meta: to_btree(msg.labels),
                                        processes,
                                        ..domain::Release::default() };
        let release = self.state.releases.add(release).await.map_err(ApiError::from)?;
        Ok(Response::new(release_to_proto(&release)))
    }

    async fn create_scale(&self, request: Request<proto::CreateScaleRequest>) -> Result<Response<proto::ScaleRequest>, Status> {
        let req = request.into_inner();
        let app = lookup_app(&self.state, required_segment(&req.parent, "apps")?).await?;
        let release = release_for_app(&self.state, &app, required_segment(&req.parent, "releases")?).await?;
        let processes = to_btree(req.processes);
        validate_processes(&release, &processes).map_err(ApiError::from)?;
        let tags = (!req.tags.is_empty()).then(|| tags_from_proto(req.tags));
        let sr = self.state.scales.create(app.id, release.id, Some(processes), tags).await.map_err(ApiError::from)?;
        Ok(Response::new(scale_to_proto(&sr)))
    }

    async fn create_deployment(&self,
                               request: Request<proto::CreateDeploymentRequest>)
                               -> Result<Response<Self::CreateDeploymentStream>, Status> {
        let req = request.into_inner();
        let app = lookup_app(&self.state, required_segment(&req.parent, "apps")?).await?;
        let release_id = name_segment(&req.release, "releases").unwrap_or(&req.release);
        let release = release_for_app(&self.state, &app, release_id).await?;
        let body = DeployBody { id: release.id,
                                processes: None,
                                tags: None };
        let (deployment, mut sub) = deploy_and_subscribe(&self.state, &app, body).await?;
        let parent = deployment_name(&deployment);
        Ok(Response::new(Box::pin(stream! {
            while let Some(ev) = next_deployment_event(&mut sub, deployment.id).await {
                yield Ok(deployment_event_to_proto(&parent, &ev, Some(Utc::now())));
                if ev.status.is_final() {
                    return;
                }
            }
            match sub.err() {
                Some(err) => yield Err(Status::unavailable(err.to_string())),
                None => yield Err(Status::cancelled("deployment stream closed")),
            }
        }) as Self::CreateDeploymentStream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_filters_match_children() {
        let filters = vec!["apps/a".to_string()];
        assert!(name_matches("apps/a", &filters));
        assert!(name_matches("apps/a/releases/r", &filters));
        assert!(!name_matches("apps/ab/releases/r", &filters));
        assert!(name_matches("apps/z", &[]));
    }

    #[test]
    fn segments_from_resource_names() {
        assert_eq!(name_segment("apps/a/releases/r/scales/s", "releases"), Some("r"));
        assert_eq!(name_segment("apps/a", "releases"), None);
        assert!(required_segment("apps/", "apps").is_err());
    }

    #[test]
    fn offset_pagination() {
        let (page, next) = paginate((0..5).collect(), 2, "").unwrap();
        assert_eq!((page, next.as_str()), (vec![0, 1], "2"));
        let (page, next) = paginate((0..5).collect(), 2, "4").unwrap();
        assert_eq!((page, next.as_str()), (vec![4], ""));
        assert!(paginate(vec![1], 2, "x").is_err());
        let (page, next) = paginate((0..5).collect::<Vec<i32>>(), 2, &usize::MAX.to_string()).unwrap();
        assert!(page.is_empty() && next.is_empty());
    }

    #[test]
    fn label_filter_conversion() {
        use proto::label_filter::expression::Operator;
        let filters = vec![proto::LabelFilter { expressions: vec![proto::label_filter::Expression { key: "env".into(),
                                                                                                     op: Operator::NotIn as i32,
                                                                                                     values: vec!["prod".into()] }] }];
        let converted = label_filters(filters).unwrap();
        assert_eq!(converted[0].expressions[0].op, LabelFilterOp::NotIn);
        let bad = vec![proto::LabelFilter { expressions: vec![proto::label_filter::Expression { key: "env".into(),
                                                                                                op: 9,
                                                                                                values: vec![] }] }];
        assert!(label_filters(bad).is_err());
    }
}
