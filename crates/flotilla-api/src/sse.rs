//! Server-Sent Events.
//!
//! Los listados con stream envían primero los elementos actuales, luego un
//! evento `page_complete` y después los cambios en vivo. Si la suscripción
//! se cierra con error se envía un evento `error` antes de terminar.

use std::convert::Infallible;

use async_stream::stream;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use flotilla_core::EventSubscriber;
use flotilla_domain::Event;
use serde::Serialize;

use crate::error::{ApiError, Result};

pub const PAGE_COMPLETE: &str = "page_complete";

pub type SseStream = Sse<std::pin::Pin<Box<dyn Stream<Item = std::result::Result<SseEvent, Infallible>> + Send>>>;

pub fn wants_sse(headers: &HeaderMap) -> bool {
    headers.get(header::ACCEPT)
           .and_then(|v| v.to_str().ok())
           .is_some_and(|v| v.contains("text/event-stream"))
}

/// `Last-Event-Id`, si viene. Un valor no numérico es un error de validación.
pub fn last_event_id(headers: &HeaderMap) -> Result<Option<i64>> {
    match headers.get("last-event-id").and_then(|v| v.to_str().ok()) {
        None | Some("") => Ok(None),
        Some(v) => v.trim().parse().map(Some).map_err(|_| ApiError::validation("Last-Event-Id", "is invalid")),
    }
}

pub fn data<T: Serialize>(value: &T) -> SseEvent {
    SseEvent::default().json_data(value).unwrap_or_else(|e| SseEvent::default().event("error").data(e.to_string()))
}

pub fn event_frame(event: &Event) -> SseEvent { data(event).id(event.id.to_string()) }

pub fn error_frame(message: impl Into<String>) -> SseEvent { SseEvent::default().event("error").data(message.into()) }

pub fn respond<S>(stream: S) -> SseStream
    where S: Stream<Item = std::result::Result<SseEvent, Infallible>> + Send + 'static
{
    Sse::new(Box::pin(stream) as _).keep_alive(KeepAlive::default())
}

/// Elementos iniciales, `page_complete` y luego cada evento que `map`
/// convierta en un elemento. `map` devuelve `None` para saltar el evento y
/// `Err` para cerrar el stream.
pub fn list_then_live<T, F>(initial: Vec<T>, mut sub: EventSubscriber, mut map: F) -> SseStream
    where T: Serialize + Send + Sync + 'static,
          F: FnMut(&Event) -> std::result::Result<Option<T>, ()> + Send + 'static
{
    respond(stream! {
        for item in &initial {
            yield Ok(data(item));
        }
        yield Ok(SseEvent::default().event(PAGE_COMPLETE).data("{}"));
        while let Some(event) = sub.next().await {
            match map(&event) {
                Ok(Some(item)) => yield Ok(data(&item).id(event.id.to_string())),
                Ok(None) => continue,
                Err(()) => return,
            }
        }
        if let Some(err) = sub.err() {
            yield Ok(error_frame(err.to_string()));
        }
    })
}

/// Historial seguido de los eventos en vivo, tal cual.
pub fn events(history: Vec<Event>, sub: EventSubscriber) -> SseStream {
    let mut sub = sub;
    respond(stream! {
        for event in &history {
            yield Ok(event_frame(event));
        }
        while let Some(event) = sub.next().await {
            yield Ok(event_frame(&event));
        }
        if let Some(err) = sub.err() {
            yield Ok(error_frame(err.to_string()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_event_id_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(last_event_id(&headers).unwrap(), None);
        headers.insert("last-event-id", "42".parse().unwrap());
        assert_eq!(last_event_id(&headers).unwrap(), Some(42));
        headers.insert("last-event-id", "abc".parse().unwrap());
        assert!(matches!(last_event_id(&headers), Err(ApiError::Validation { .. })));
    }

    #[test]
    fn accept_header_selects_sse() {
        let mut headers = HeaderMap::new();
        assert!(!wants_sse(&headers));
        headers.insert(header::ACCEPT, "text/event-stream".parse().unwrap());
        assert!(wants_sse(&headers));
    }
}
