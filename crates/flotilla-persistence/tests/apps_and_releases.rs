mod test_support;

use flotilla_domain::{App, Artifact, ArtifactType, DomainError, Formation, Processes, Release};
use flotilla_persistence::{ArtifactRepo, FormationRepo, PersistenceError, ReleaseRepo};
use test_support::{app_repo, create_app, create_release, test_db, unique_name};

#[tokio::test]
async fn duplicate_app_name_is_a_conflict() {
    let Some(db) = test_db().await else { return };
    let repo = app_repo(&db);
    let name = unique_name("dup");
    repo.add(App::new(&name)).await.unwrap();
    let err = repo.add(App::new(&name)).await.unwrap_err();
    match err {
        PersistenceError::Domain(DomainError::Conflict(msg)) => assert!(msg.contains(&name)),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn apps_without_name_get_a_generated_one() {
    let Some(db) = test_db().await else { return };
    let app = app_repo(&db).add(App::default()).await.unwrap();
    assert!(flotilla_domain::validate_app_name(&app.name).is_ok());
    assert_eq!(app_repo(&db).get(&app.name).await.unwrap().id, app.id);
}

#[tokio::test]
async fn protected_apps_cannot_be_deleted() {
    let Some(db) = test_db().await else { return };
    let mut app = App::new(&unique_name("sys"));
    app.meta.insert("protected".into(), "true".into());
    let app = app_repo(&db).add(app).await.unwrap();
    let err = app_repo(&db).remove(app.id).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Domain(DomainError::Validation { .. })));
}

#[tokio::test]
async fn deleting_an_app_soft_deletes_its_releases() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = create_release(&db, &app, &["web"]).await;
    let deletion = app_repo(&db).remove(app.id).await.unwrap();
    assert_eq!(deletion.deleted_releases, vec![release.id]);
    assert!(app_repo(&db).get(&app.id.to_string()).await.is_err());
    assert!(ReleaseRepo::new(db.clone()).get(release.id).await.is_err());
}

#[tokio::test]
async fn artifacts_are_deduplicated_by_type_and_uri() {
    let Some(db) = test_db().await else { return };
    let repo = ArtifactRepo::new(db.clone());
    let uri = format!("https://registry.test/{}", unique_name("img"));
    let first = repo.add(Artifact::new(ArtifactType::Docker, &uri)).await.unwrap();
    let second = repo.add(Artifact::new(ArtifactType::Docker, &uri)).await.unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn releases_are_immutable() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = create_release(&db, &app, &["web"]).await;
    let again = Release { created_at: None, ..release.clone() };
    let err = ReleaseRepo::new(db.clone()).add(again).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Domain(DomainError::Conflict(_))));
}

#[tokio::test]
async fn release_with_unknown_artifact_is_rejected() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = Release { app_id: Some(app.id),
                            artifacts: vec![uuid::Uuid::new_v4()],
                            ..Release::default() };
    let err = ReleaseRepo::new(db.clone()).add(release).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Domain(DomainError::Validation { .. })));
}

#[tokio::test]
async fn formation_rejects_unknown_process_types() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = create_release(&db, &app, &["web"]).await;
    let processes: Processes = [("worker".to_string(), 1)].into_iter().collect();
    let err = FormationRepo::new(db.clone()).put(Formation::new(app.id, release.id, processes)).await.unwrap_err();
    match err {
        PersistenceError::Domain(DomainError::Validation { message, .. }) => assert!(message.contains("worker")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn formation_put_then_delete_is_reported_as_deleted() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = create_release(&db, &app, &["web"]).await;
    let repo = FormationRepo::new(db.clone());
    let processes: Processes = [("web".to_string(), 2)].into_iter().collect();
    let stored = repo.put(Formation::new(app.id, release.id, processes.clone())).await.unwrap();
    assert_eq!(stored.processes, processes);
    assert!(stored.updated_at.is_some());

    let expanded = repo.get_expanded(app.id, release.id).await.unwrap();
    assert!(!expanded.deleted);
    assert_eq!(expanded.artifacts.len(), 1);

    repo.remove(app.id, release.id).await.unwrap();
    let expanded = repo.get_expanded(app.id, release.id).await.unwrap();
    assert!(expanded.deleted);
    assert!(expanded.processes.is_empty());
}
