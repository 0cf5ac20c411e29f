//! Log de eventos: consulta paginada y stream SSE con reanudación por
//! `Last-Event-Id`.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use flotilla_core::{subscribe_with_history, EventFilter, EventQuery, EventSource};
use flotilla_domain::EventType;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::sse::{self, last_event_id, wants_sse};
use crate::state::ApiState;

pub fn routes() -> Router<ApiState> { Router::new().route("/events", get(list_events)).route("/events/:id", get(get_event)) }

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventsQuery {
    app_id: Option<Uuid>,
    /// Tipos separados por coma.
    object_types: Option<String>,
    object_id: Option<String>,
    /// Con stream: reproducir también el historial.
    past: bool,
    count: Option<i64>,
    since_id: Option<i64>,
    before_id: Option<i64>,
}

impl EventsQuery {
    fn filter(&self) -> Result<EventFilter> {
        let object_types = match self.object_types.as_deref() {
            None | Some("") => Vec::new(),
            Some(list) => list.split(',')
                              .map(str::trim)
                              .filter(|s| !s.is_empty())
                              .map(|s| s.parse::<EventType>())
                              .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(EventFilter { app_id: self.app_id,
                         object_types,
                         object_id: self.object_id.clone().filter(|id| !id.is_empty()) })
    }
}

async fn list_events(State(state): State<ApiState>, headers: HeaderMap, Query(q): Query<EventsQuery>) -> Result<Response> {
    let filter = q.filter()?;
    if let Some(count) = q.count.filter(|c| *c < 0) {
        return Err(ApiError::validation("count", format!("must not be negative: {count}")));
    }
    if !wants_sse(&headers) {
        let query = EventQuery { filter,
                                 since_id: q.since_id,
                                 before_id: q.before_id,
                                 count: q.count,
                                 ascending: false };
        return Ok(Json(state.events.query(&query).await?).into_response());
    }

    let since = last_event_id(&headers)?.or(q.since_id);
    if q.past || since.is_some() {
        let (history, sub) = subscribe_with_history(&state.events, state.listener.as_ref(), filter, since, q.count).await?;
        tracing::debug!(replayed = history.len(), since_id = ?since, "event stream opened");
        return Ok(sse::events(history, sub).into_response());
    }
    let sub = state.listener.subscribe(filter).await?;
    Ok(sse::events(Vec::new(), sub).into_response())
}

async fn get_event(State(state): State<ApiState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let id: i64 = id.parse().map_err(|_| ApiError::not_found("event"))?;
    Ok(Json(state.events.fetch(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_types_are_comma_separated() {
        let q = EventsQuery { object_types: Some("app, release,deployment".into()),
                              ..EventsQuery::default() };
        let filter = q.filter().unwrap();
        assert_eq!(filter.object_types, vec![EventType::App, EventType::Release, EventType::Deployment]);
    }

    #[test]
    fn unknown_object_type_is_rejected() {
        let q = EventsQuery { object_types: Some("app,bogus".into()),
                              ..EventsQuery::default() };
        assert!(matches!(q.filter(), Err(ApiError::Validation { .. })));
    }
}
