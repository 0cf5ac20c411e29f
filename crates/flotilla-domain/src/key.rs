//! Claves SSH públicas.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Key {
    /// Fingerprint MD5 en hex, sin separadores.
    pub id: String,
    pub key: String,
    pub comment: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Key {
    /// Parsea una línea `authorized_keys` (`<algo> <base64> [comment]`).
    pub fn parse(line: &str) -> Result<Key, DomainError> {
        let mut parts = line.split_whitespace();
        let algo = parts.next().ok_or_else(|| DomainError::validation("key", "must not be empty"))?;
        let body = parts.next().ok_or_else(|| DomainError::validation("key", "missing key data"))?;
        let comment = parts.collect::<Vec<_>>().join(" ");
        let wire = STANDARD.decode(body)
                           .map_err(|e| DomainError::validation("key", format!("invalid base64 key data: {e}")))?;
        // El wire form arranca con el nombre del algoritmo con prefijo de
        // longitud.
        if wire.len() < 4 {
            return Err(DomainError::validation("key", "truncated key data"));
        }
        let n = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
        if wire.len() < 4 + n || &wire[4..4 + n] != algo.as_bytes() {
            return Err(DomainError::validation("key", "key type does not match key data"));
        }
        Ok(Key { id: fingerprint(&wire),
                 key: format!("{algo} {body}"),
                 comment,
                 created_at: None })
    }

    /// Fingerprint con separadores `aa:bb:...` como lo muestra `ssh-keygen -l -E md5`.
    pub fn colon_fingerprint(&self) -> String {
        self.id
            .as_bytes()
            .chunks(2)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// MD5 del wire form, en hex.
pub fn fingerprint(wire: &[u8]) -> String { hex::encode(Md5::digest(wire)) }
