//! Subida de blobs (backups del cluster) al blobstore.

use log::info;

use crate::error::Result;
use crate::http::JsonClient;

pub const TAR_CONTENT_TYPE: &str = "application/tar";

#[derive(Clone, Debug)]
pub struct BlobstoreClient {
    http: JsonClient,
}

impl BlobstoreClient {
    pub fn new(base_url: impl Into<String>) -> Self { Self { http: JsonClient::new(base_url) } }

    /// URL pública del blob en `path`.
    pub fn url(&self, path: &str) -> String { self.http.url(&normalize(path)) }

    pub async fn put(&self, path: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        let path = normalize(path);
        let size = body.len();
        self.http.put_bytes(&path, body, content_type, "blob").await?;
        info!("blobstore:put path={path} size={size}");
        Ok(self.http.url(&path))
    }
}

fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
