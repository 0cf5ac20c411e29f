//! Handlers CRUD genéricos sobre [`Repository`].
//!
//! Las rutas concretas sólo eligen el repositorio; el tipo del recurso sale
//! de `R::KIND`.

use axum::http::StatusCode;
use axum::Json;
use flotilla_persistence::Repository;

use crate::error::Result;

pub(crate) async fn create<R: Repository>(repo: &R, item: R::Item) -> Result<(StatusCode, Json<R::Item>)> {
    let item = repo.add(item).await?;
    tracing::debug!(kind = R::KIND, "created");
    Ok((StatusCode::CREATED, Json(item)))
}

pub(crate) async fn list<R: Repository>(repo: &R) -> Result<Json<Vec<R::Item>>> { Ok(Json(repo.list().await?)) }

pub(crate) async fn fetch<R: Repository>(repo: &R, id: &str) -> Result<Json<R::Item>> { Ok(Json(repo.get(id).await?)) }

pub(crate) async fn update<R: Repository>(repo: &R, id: &str, update: R::Update) -> Result<Json<R::Item>> {
    Ok(Json(repo.update(id, update).await?))
}

pub(crate) async fn remove<R: Repository>(repo: &R, id: &str) -> Result<Json<R::Removed>> {
    let removed = repo.remove(id).await?;
    tracing::debug!(kind = R::KIND, id, "removed");
    Ok(Json(removed))
}
