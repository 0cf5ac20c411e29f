mod common;

use std::time::Duration;

use chrono::Utc;
use common::{release, FakeCluster};
use flotilla_core::deploy::SIRENIA_PROCESS_ENV;
use flotilla_core::{Deployer, ServiceMeta};
use flotilla_domain::{Deployment, DeploymentStatus, DeploymentStrategy, JobState, Processes};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn deployment(app_id: Uuid,
              old: Option<Uuid>,
              new: Uuid,
              strategy: DeploymentStrategy,
              processes: &[(&str, i32)])
              -> Deployment {
    Deployment { id: Uuid::new_v4(),
                 app_id,
                 old_release_id: old,
                 new_release_id: new,
                 strategy,
                 processes: processes.iter().map(|(t, n)| (t.to_string(), *n)).collect::<Processes>(),
                 ..Deployment::default() }
}

fn last_error(cluster: &FakeCluster) -> Option<String> {
    cluster.with(|s| s.events.iter().rev().find(|e| e.status == DeploymentStatus::Failed).and_then(|e| e.error.clone()))
}

#[tokio::test]
async fn one_by_one_replaces_each_instance() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let old = release(&[("web", None)]);
    let new = release(&[("web", None)]);
    let (old_id, new_id) = (old.id, new.id);
    cluster.add_release(old);
    cluster.add_release(new);
    cluster.seed_formation(app, old_id, &[("web", 3)]);

    let d = deployment(app, Some(old_id), new_id, DeploymentStrategy::OneByOne, &[("web", 3)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Complete);
    cluster.with(|s| {
               assert_eq!(s.finished, Some(DeploymentStatus::Complete));
               assert_eq!(s.app_release, Some(new_id));
               assert_eq!(s.formations[&(app, new_id)].count("web"), 3);
               assert_eq!(s.formations[&(app, old_id)].count("web"), 0);
               assert_eq!(s.job_events(JobState::Starting), 3);
               assert_eq!(s.job_events(JobState::Up), 3);
               assert_eq!(s.job_events(JobState::Stopping), 3);
               assert_eq!(s.job_events(JobState::Down), 3);
               let statuses: Vec<DeploymentStatus> = s.events.iter().map(|e| e.status).collect();
               assert_eq!(statuses.first(), Some(&DeploymentStatus::Running));
               assert_eq!(statuses.last(), Some(&DeploymentStatus::Complete));
               assert!(s.events.iter().all(|e| e.app_id == app));
           });
}

#[tokio::test]
async fn one_by_one_never_runs_more_than_one_extra_instance() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let old = release(&[("web", None)]);
    let new = release(&[("web", None)]);
    let (old_id, new_id) = (old.id, new.id);
    cluster.add_release(old);
    cluster.add_release(new);
    cluster.seed_formation(app, old_id, &[("web", 2)]);

    let d = deployment(app, Some(old_id), new_id, DeploymentStrategy::OneByOne, &[("web", 2)]);
    Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    // cada "up" del release nuevo va seguido del "stopping" de uno viejo
    cluster.with(|s| {
               let states: Vec<(Uuid, JobState)> = s.events.iter().filter_map(|e| e.job_state.map(|st| (e.release_id, st))).collect();
               assert_eq!(states,
                          vec![(new_id, JobState::Starting),
                               (new_id, JobState::Up),
                               (old_id, JobState::Stopping),
                               (old_id, JobState::Down),
                               (new_id, JobState::Starting),
                               (new_id, JobState::Up),
                               (old_id, JobState::Stopping),
                               (old_id, JobState::Down)]);
           });
}

#[tokio::test]
async fn all_at_once_scales_up_then_down() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let old = release(&[("web", None)]);
    let new = release(&[("web", None), ("worker", None)]);
    let (old_id, new_id) = (old.id, new.id);
    cluster.add_release(old);
    cluster.add_release(new);
    cluster.seed_formation(app, old_id, &[("web", 1)]);

    let d = deployment(app, Some(old_id), new_id, DeploymentStrategy::AllAtOnce, &[("web", 2), ("worker", 1)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Complete);
    cluster.with(|s| {
               assert_eq!(s.job_events(JobState::Up), 3);
               assert_eq!(s.job_events(JobState::Down), 1);
               let running_new = s.jobs.iter().filter(|j| j.release_id == new_id && j.state == JobState::Up).count();
               assert_eq!(running_new, 3);
               assert!(s.jobs.iter().filter(|j| j.release_id == old_id).all(|j| j.state == JobState::Down));
           });
}

#[tokio::test]
async fn first_deploy_without_old_release() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let new = release(&[("web", None)]);
    let new_id = new.id;
    cluster.add_release(new);

    let d = deployment(app, None, new_id, DeploymentStrategy::AllAtOnce, &[("web", 1)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();
    assert_eq!(status, DeploymentStatus::Complete);
    assert_eq!(cluster.with(|s| s.app_release), Some(new_id));
}

#[tokio::test(start_paused = true)]
async fn wait_timeout_fails_the_deployment() {
    let cluster = FakeCluster::new();
    cluster.with(|s| s.stuck = true);
    let app = Uuid::new_v4();
    let new = release(&[("web", None)]);
    let new_id = new.id;
    cluster.add_release(new);

    let mut d = deployment(app, None, new_id, DeploymentStrategy::AllAtOnce, &[("web", 1)]);
    d.deploy_timeout = 1;
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Failed);
    assert!(last_error(&cluster).unwrap().contains("timed out"));
    // sin rollback: la formation nueva queda como estaba
    cluster.with(|s| {
               assert_eq!(s.formations[&(app, new_id)].count("web"), 1);
               assert_eq!(s.app_release, None);
           });
}

#[tokio::test]
async fn host_error_fails_the_deployment() {
    let cluster = FakeCluster::new();
    cluster.with(|s| s.host_error = Some("no space left on device".into()));
    let app = Uuid::new_v4();
    let new = release(&[("web", None)]);
    let new_id = new.id;
    cluster.add_release(new);

    let d = deployment(app, None, new_id, DeploymentStrategy::OneByOne, &[("web", 2)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Failed);
    assert_eq!(last_error(&cluster).as_deref(), Some("deployer: web job failed to start: no space left on device"));
}

#[tokio::test(start_paused = true)]
async fn cancellation_finishes_as_cancelled_without_failed_event() {
    let cluster = FakeCluster::new();
    cluster.with(|s| s.stuck = true);
    let app = Uuid::new_v4();
    let new = release(&[("web", None)]);
    let new_id = new.id;
    cluster.add_release(new);

    let mut d = deployment(app, None, new_id, DeploymentStrategy::AllAtOnce, &[("web", 1)]);
    d.deploy_timeout = 300;
    let cancel = CancellationToken::new();
    let deployer = Deployer::new(cluster.context());
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { deployer.deploy(d, cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let status = task.await.unwrap().unwrap();
    assert_eq!(status, DeploymentStatus::Cancelled);
    assert_eq!(cluster.with(|s| s.finished), Some(DeploymentStatus::Cancelled));
    assert_eq!(last_error(&cluster), None);
}

#[tokio::test]
async fn finished_deployment_is_skipped() {
    let cluster = FakeCluster::new();
    let mut d = deployment(Uuid::new_v4(), None, Uuid::new_v4(), DeploymentStrategy::AllAtOnce, &[]);
    d.status = DeploymentStatus::Complete;
    d.finished_at = Some(Utc::now());
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();
    assert_eq!(status, DeploymentStatus::Complete);
    cluster.with(|s| {
               assert!(s.events.is_empty());
               assert_eq!(s.finished, None);
           });
}

fn sirenia_release() -> flotilla_domain::Release {
    let mut r = release(&[("postgres", Some("pg")), ("web", None)]);
    r.env.insert(SIRENIA_PROCESS_ENV.into(), "postgres".into());
    r
}

fn set_cluster_state(cluster: &FakeCluster, singleton: bool) -> Vec<String> {
    cluster.with(|s| {
               let peers: Vec<_> = s.instances.iter().map(|(_, i)| i.clone()).collect();
               let data = serde_json::json!({
                   "singleton": singleton,
                   "primary": peers[0],
                   "sync": peers[1],
                   "async": peers[2..],
               });
               s.meta.insert("pg".into(), ServiceMeta { data, index: 1 });
               peers.iter().map(|p| p.id.clone()).collect()
           })
}

#[tokio::test]
async fn sirenia_replaces_asyncs_then_sync_then_primary() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let old = sirenia_release();
    let new = sirenia_release();
    let (old_id, new_id) = (old.id, new.id);
    cluster.add_release(old);
    cluster.add_release(new);
    cluster.seed_formation(app, old_id, &[("postgres", 3)]);
    let peers = set_cluster_state(&cluster, false);
    let (primary, sync, async1) = (peers[0].clone(), peers[1].clone(), peers[2].clone());

    let d = deployment(app, Some(old_id), new_id, DeploymentStrategy::Sirenia, &[("postgres", 3)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Complete, "error: {:?}", last_error(&cluster));
    cluster.with(|s| {
               let fresh = s.new_instances(new_id);
               assert_eq!(fresh.len(), 3);
               let (n1, n2, n3) = (fresh[0].id.clone(), fresh[1].id.clone(), fresh[2].id.clone());
               assert_eq!(s.syncs,
                          vec![(sync.clone(), n1.clone()), (primary.clone(), n1.clone()), (n1.clone(), n2.clone()), (n2, n3)]);
               assert_eq!(s.read_writes, vec![fresh[0].addr.clone()]);
               assert_eq!(s.job_events(JobState::Starting), 3);
               assert_eq!(s.job_events(JobState::Stopping), 3);
               assert!(s.jobs.iter().filter(|j| j.release_id == old_id).all(|j| j.state == JobState::Down));
               assert_eq!(s.formations[&(app, old_id)].count("postgres"), 0);
               assert_eq!(s.app_release, Some(new_id));
               // el primer peer parado fue el async
               let first_down = s.jobs.iter().find(|j| j.id == async1).map(|j| j.state);
               assert_eq!(first_down, Some(JobState::Down));
           });
}

#[tokio::test]
async fn sirenia_refuses_singleton_clusters() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let old = sirenia_release();
    let new = sirenia_release();
    let (old_id, new_id) = (old.id, new.id);
    cluster.add_release(old);
    cluster.add_release(new);
    cluster.seed_formation(app, old_id, &[("postgres", 3)]);
    set_cluster_state(&cluster, true);

    let d = deployment(app, Some(old_id), new_id, DeploymentStrategy::Sirenia, &[("postgres", 3)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Failed);
    assert_eq!(last_error(&cluster).as_deref(), Some("sirenia cluster in singleton mode"));
    assert!(cluster.with(|s| s.new_instances(new_id).is_empty()));
}

#[tokio::test]
async fn discoverd_meta_restores_service_metadata() {
    let cluster = FakeCluster::new();
    let app = Uuid::new_v4();
    let old = release(&[("app", Some("disco"))]);
    let new = release(&[("app", Some("disco"))]);
    let (old_id, new_id) = (old.id, new.id);
    cluster.add_release(old);
    cluster.add_release(new);
    cluster.seed_formation(app, old_id, &[("app", 1)]);
    let meta = ServiceMeta { data: serde_json::json!({"leader": "x"}),
                             index: 7 };
    cluster.with(|s| s.meta.insert("disco".into(), meta.clone()));

    let d = deployment(app, Some(old_id), new_id, DeploymentStrategy::DiscoverdMeta, &[("app", 1)]);
    let status = Deployer::new(cluster.context()).deploy(d, CancellationToken::new()).await.unwrap();

    assert_eq!(status, DeploymentStatus::Complete, "error: {:?}", last_error(&cluster));
    cluster.with(|s| {
               assert_eq!(s.meta.get("disco"), Some(&meta));
               assert_eq!(s.new_instances(new_id).len(), 1);
           });
}
