//! Autorización por clave compartida.
//!
//! La clave llega como password de `Basic`, en la cabecera/metadata
//! `Auth-Key` o, sólo para streams SSE, en `?key=`. La comparación es de
//! tiempo constante contra todas las claves aceptadas. `/ping` y `/ca-cert`
//! no requieren clave y `OPTIONS` se responde sin más.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::error::ApiError;

pub const AUTH_KEY_HEADER: &str = "auth-key";

const OPEN_PATHS: [&str; 2] = ["/ping", "/ca-cert"];

/// Id de la clave que autorizó la petición, disponible como extensión.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyId(pub String);

/// Claves aceptadas y sus ids (misma longitud).
#[derive(Debug, Clone, Default)]
pub struct AuthKeys {
    keys: Vec<(String, String)>,
}

impl AuthKeys {
    /// Sin ids, cada clave se identifica por su posición.
    pub fn new(keys: Vec<String>, ids: Vec<String>) -> Self {
        let keys = keys.into_iter()
                       .enumerate()
                       .map(|(i, k)| {
                           let id = ids.get(i).cloned().unwrap_or_else(|| i.to_string());
                           (k, id)
                       })
                       .collect();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Id de la clave que coincide. Recorre todas para no filtrar cuál.
    pub fn authorize(&self, candidate: &str) -> Option<&str> {
        if candidate.is_empty() {
            return None;
        }
        let mut found = None;
        for (key, id) in &self.keys {
            let eq: bool = key.as_bytes().ct_eq(candidate.as_bytes()).into();
            if eq && found.is_none() {
                found = Some(id.as_str());
            }
        }
        found
    }
}

fn basic_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ").or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_, password) = decoded.split_once(':')?;
    Some(password.to_string())
}

/// `?key=` decodificada igual que cualquier otro parámetro de query.
fn query_key(uri: &Uri) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove("key")
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers.get(header::ACCEPT)
           .and_then(|v| v.to_str().ok())
           .is_some_and(|v| v.contains("text/event-stream"))
}

/// Clave presentada por la petición, si hay alguna.
pub fn presented_key(req: &Request) -> Option<String> {
    let headers = req.headers();
    if let Some(password) = basic_password(headers).filter(|p| !p.is_empty()) {
        return Some(password);
    }
    if let Some(key) = headers.get(AUTH_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    if wants_event_stream(headers) {
        return query_key(req.uri());
    }
    None
}

pub async fn require_key(State(keys): State<Arc<AuthKeys>>, mut req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    if OPEN_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }
    let key_id = presented_key(&req).and_then(|k| keys.authorize(&k).map(str::to_string));
    match key_id {
        Some(id) => {
            tracing::Span::current().record("key_id", id.as_str());
            req.extensions_mut().insert(KeyId(id));
            next.run(req).await
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "rejected unauthenticated request");
            ApiError::Unauthenticated.into_response()
        }
    }
}
