mod test_support;

use flotilla_domain::deployment::DEPLOY_IN_PROGRESS;
use flotilla_domain::{DeploymentStatus, DomainError, Formation, Processes};
use flotilla_persistence::{DeploymentRepo, FormationRepo, NewDeployment, PersistenceError};
use test_support::{app_repo, create_app, create_release, test_db};

#[tokio::test]
async fn first_deploy_completes_immediately() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = create_release(&db, &app, &["web"]).await;
    let deployment = DeploymentRepo::new(db.clone()).add(NewDeployment { app_id: app.id,
                                                                        release_id: release.id,
                                                                        ..NewDeployment::default() })
                                                    .await
                                                    .unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Complete);
    assert!(deployment.is_finished());
    assert_eq!(app_repo(&db).get(&app.id.to_string()).await.unwrap().release_id, Some(release.id));
}

#[tokio::test]
async fn only_one_unfinished_deployment_per_app() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let v1 = create_release(&db, &app, &["web"]).await;
    let v2 = create_release(&db, &app, &["web"]).await;
    let v3 = create_release(&db, &app, &["web"]).await;
    let repo = DeploymentRepo::new(db.clone());
    repo.add(NewDeployment { app_id: app.id,
                             release_id: v1.id,
                             ..NewDeployment::default() })
        .await
        .unwrap();
    let processes: Processes = [("web".to_string(), 2)].into_iter().collect();
    FormationRepo::new(db.clone()).put(Formation::new(app.id, v1.id, processes.clone())).await.unwrap();

    let pending = repo.add(NewDeployment { app_id: app.id,
                                           release_id: v2.id,
                                           ..NewDeployment::default() })
                      .await
                      .unwrap();
    assert_eq!(pending.status, DeploymentStatus::Pending);
    assert_eq!(pending.old_release_id, Some(v1.id));
    assert_eq!(pending.processes, processes);

    let err = repo.add(NewDeployment { app_id: app.id,
                                       release_id: v3.id,
                                       ..NewDeployment::default() })
                  .await
                  .unwrap_err();
    match err {
        PersistenceError::Domain(DomainError::Conflict(msg)) => assert_eq!(msg, DEPLOY_IN_PROGRESS),
        other => panic!("expected conflict, got {other:?}"),
    }

    repo.finish(pending.id, DeploymentStatus::Failed).await.unwrap();
    repo.add(NewDeployment { app_id: app.id,
                             release_id: v3.id,
                             ..NewDeployment::default() })
        .await
        .unwrap();
}
