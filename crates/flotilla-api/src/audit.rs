//! Log de auditoría de cuerpos de petición (`AUDIT_LOG=true`).
//!
//! Antes de escribir el cuerpo se ocultan las variables de entorno con
//! nombres sensibles y la clave privada de los certificados de rutas.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::error::ApiError;

pub const REDACTED: &str = "[REDACTED]";

const MAX_AUDIT_BODY: usize = 4 * 1024 * 1024;
const SENSITIVE: [&str; 5] = ["key", "token", "pass", "secret", "url"];

pub fn is_sensitive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE.iter().any(|s| lower.contains(s))
}

/// Oculta in situ los valores sensibles de `env` y `certificate.key`.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (name, child) in map.iter_mut() {
                match (name.as_str(), child) {
                    ("env", Value::Object(env)) => {
                        for (k, v) in env.iter_mut() {
                            if is_sensitive(k) {
                                *v = Value::String(REDACTED.into());
                            }
                        }
                    }
                    ("certificate", Value::Object(cert)) => {
                        if let Some(key) = cert.get_mut("key") {
                            *key = Value::String(REDACTED.into());
                        }
                    }
                    (_, child) => redact(child),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn is_json(req: &Request) -> bool {
    req.headers()
       .get(header::CONTENT_TYPE)
       .and_then(|v| v.to_str().ok())
       .is_some_and(|v| v.starts_with("application/json"))
}

pub async fn audit_body(State(enabled): State<bool>, req: Request, next: Next) -> Response {
    if !enabled || req.method() == Method::GET || !is_json(&req) {
        return next.run(req).await;
    }
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_AUDIT_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return ApiError::validation("body", "is too large").into_response(),
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(mut value) => {
            redact(&mut value);
            tracing::info!(method = %parts.method, path = %parts.uri.path(), body = %value, "audit");
        }
        Err(_) => tracing::info!(method = %parts.method, path = %parts.uri.path(), size = bytes.len(), "audit (non-json body)"),
    }
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn env_secrets_are_hidden() {
        let mut body = json!({
            "env": {"DATABASE_URL": "postgres://u:p@h/db", "PORT": "80", "API_TOKEN": "t", "PGPASSWORD": "x"},
            "processes": {"web": {"env": {"SECRET_KEY_BASE": "s", "RAILS_ENV": "production"}}}
        });
        redact(&mut body);
        assert_eq!(body["env"]["DATABASE_URL"], REDACTED);
        assert_eq!(body["env"]["API_TOKEN"], REDACTED);
        assert_eq!(body["env"]["PGPASSWORD"], REDACTED);
        assert_eq!(body["env"]["PORT"], "80");
        assert_eq!(body["processes"]["web"]["env"]["SECRET_KEY_BASE"], REDACTED);
        assert_eq!(body["processes"]["web"]["env"]["RAILS_ENV"], "production");
    }

    #[test]
    fn route_certificate_key_is_hidden() {
        let mut body = json!({"type": "http", "domain": "a.example.com",
                              "certificate": {"cert": "CERT", "key": "PRIVATE"}});
        redact(&mut body);
        assert_eq!(body["certificate"]["key"], REDACTED);
        assert_eq!(body["certificate"]["cert"], "CERT");
        assert_eq!(body["domain"], "a.example.com");
    }
}
