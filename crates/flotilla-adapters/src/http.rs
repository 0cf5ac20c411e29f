//! Cliente JSON compartido por todos los adaptadores.

use std::time::Duration;

use futures::StreamExt;
use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{AdapterError, Result};
use crate::sse::SseParser;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const STREAM_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct JsonClient {
    base_url: String,
    client: reqwest::Client,
    streaming: reqwest::Client,
}

impl JsonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder().timeout(DEFAULT_REQUEST_TIMEOUT)
                                               .build()
                                               .unwrap_or_else(|_| reqwest::Client::new());
        Self { base_url: base_url.into().trim_end_matches('/').to_string(),
               client,
               // Sin timeout global: los streams viven indefinidamente.
               streaming: reqwest::Client::new() }
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    pub fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    fn request(&self, method: Method, path: &str) -> RequestBuilder { self.client.request(method, self.url(path)) }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let res = self.request(Method::GET, path).send().await?;
        decode(check(res, what).await?).await
    }

    /// Como `get`, pero un 404 es `None`.
    pub async fn get_opt<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<Option<T>> {
        match self.get(path, what).await {
            Ok(v) => Ok(Some(v)),
            Err(AdapterError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B, what: &str) -> Result<T>
        where B: Serialize + ?Sized,
              T: DeserializeOwned
    {
        let res = self.request(method, path).json(body).send().await?;
        decode(check(res, what).await?).await
    }

    /// Envía el cuerpo e ignora la respuesta.
    pub async fn send_unit<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>, what: &str) -> Result<()> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        check(req.send().await?, what).await?;
        Ok(())
    }

    pub async fn put_bytes(&self, path: &str, body: Vec<u8>, content_type: &str, what: &str) -> Result<()> {
        let res = self.client
                      .put(self.url(path))
                      .header(reqwest::header::CONTENT_TYPE, content_type)
                      .body(body)
                      .send()
                      .await?;
        check(res, what).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str, what: &str) -> Result<()> {
        check(self.request(Method::DELETE, path).send().await?, what).await?;
        Ok(())
    }

    /// Abre un stream SSE y decodifica cada `data` como `T`. El canal se
    /// cierra cuando el servidor corta o llega un payload inválido.
    pub async fn stream<T>(&self, path: &str, what: &str) -> Result<mpsc::Receiver<T>>
        where T: DeserializeOwned + Send + 'static
    {
        let res = self.streaming.get(self.url(path)).header(ACCEPT, "text/event-stream").send().await?;
        let res = check(res, what).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let what = what.to_string();
        tokio::spawn(async move {
            let mut body = res.bytes_stream();
            let mut parser = SseParser::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("stream:error what={what} err={e}");
                        return;
                    }
                };
                for ev in parser.push(&chunk) {
                    let item = match serde_json::from_str::<T>(&ev.data) {
                        Ok(item) => item,
                        Err(e) => {
                            warn!("stream:decode_error what={what} err={e}");
                            return;
                        }
                    };
                    if tx.send(item).await.is_err() {
                        debug!("stream:receiver_closed what={what}");
                        return;
                    }
                }
            }
            debug!("stream:eof what={what}");
        });
        Ok(rx)
    }
}

pub(crate) async fn check(res: Response, what: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.bytes().await.unwrap_or_default();
    Err(AdapterError::from_response(status, &body, what))
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
    let body = res.bytes().await?;
    // Algunos endpoints responden vacío; se interpreta como `null`.
    let body: &[u8] = if body.is_empty() { b"null" } else { &body };
    Ok(serde_json::from_slice(body)?)
}
