mod test_support;

use flotilla_domain::{DomainError, Labels, Provider, Sink};
use flotilla_persistence::{AppUpdate, PersistenceError, ProviderRepo, ReleaseRepo, Repository, SinkRepo};
use test_support::{app_repo, create_app, create_release, test_db, unique_name};

fn is_not_found(err: &PersistenceError) -> bool { matches!(err, PersistenceError::Domain(DomainError::NotFound(_))) }

fn is_rejected(err: &PersistenceError, kind: &str) -> bool {
    matches!(err, PersistenceError::Domain(DomainError::Validation { field, .. }) if field == kind)
}

/// Alta, lectura por id en texto, listado y borrado sin conocer el tipo.
async fn add_get_list_remove<R, F>(repo: &R, item: R::Item, id_of: F) -> R::Removed
    where R: Repository,
          R::Item: std::fmt::Debug,
          F: Fn(&R::Item) -> String
{
    let added = repo.add(item).await.unwrap();
    let id = id_of(&added);
    assert_eq!(id_of(&repo.get(&id).await.unwrap()), id);
    assert!(repo.list().await.unwrap().iter().any(|i| id_of(i) == id));
    let removed = repo.remove(&id).await.unwrap();
    assert!(is_not_found(&repo.get(&id).await.unwrap_err()));
    removed
}

#[tokio::test]
async fn sinks_follow_the_generic_contract() {
    let Some(db) = test_db().await else { return };
    let repo = SinkRepo::new(db.clone());
    let sink = Sink { kind: "syslog".into(),
                      config: serde_json::json!({ "url": "syslog://logs.test:514" }),
                      ..Sink::default() };
    let removed = add_get_list_remove(&repo, sink, |s| s.id.to_string()).await;
    assert_eq!(removed.kind, "syslog");

    assert!(is_not_found(&Repository::get(&repo, "not-a-uuid").await.unwrap_err()));
    let err = Repository::update(&repo, &removed.id.to_string(), removed.clone()).await.unwrap_err();
    assert!(is_rejected(&err, "sink"));
}

#[tokio::test]
async fn apps_update_and_remove_by_name() {
    let Some(db) = test_db().await else { return };
    let repo = app_repo(&db);
    let app = create_app(&db).await;
    let meta: Labels = [("owner".to_string(), "ops".to_string())].into();
    let update = AppUpdate { meta: Some(meta.clone()),
                             ..AppUpdate::default() };

    let updated = Repository::update(&repo, &app.name, update).await.unwrap();
    assert_eq!((updated.id, updated.meta), (app.id, meta));

    let deletion = Repository::remove(&repo, &app.name).await.unwrap();
    assert_eq!(deletion.app.id, app.id);
    assert!(is_not_found(&Repository::get(&repo, &app.id.to_string()).await.unwrap_err()));
}

#[tokio::test]
async fn release_removal_goes_through_its_app() {
    let Some(db) = test_db().await else { return };
    let app = create_app(&db).await;
    let release = create_release(&db, &app, &["web"]).await;
    let repo = ReleaseRepo::new(db.clone());

    let deletion = Repository::remove(&repo, &release.id.to_string()).await.unwrap();
    assert_eq!((deletion.app_id, deletion.release_id), (app.id, release.id));
    assert!(is_rejected(&Repository::update(&repo, &release.id.to_string(), release.clone()).await.unwrap_err(), "release"));
}

#[tokio::test]
async fn providers_cannot_be_removed() {
    let Some(db) = test_db().await else { return };
    let repo = ProviderRepo::new(db.clone());
    let provider = Provider { name: unique_name("pg"),
                              url: "http://pg.discoverd".into(),
                              ..Provider::default() };
    let provider = Repository::add(&repo, provider).await.unwrap();
    let err = Repository::remove(&repo, &provider.name).await.unwrap_err();
    assert!(is_rejected(&err, "provider"));
    assert_eq!(Repository::get(&repo, &provider.name).await.unwrap().id, provider.id);
}
