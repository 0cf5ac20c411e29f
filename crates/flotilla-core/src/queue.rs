//! Contratos de la cola de trabajos en segundo plano.
//!
//! La cola durable vive en Postgres (`flotilla-persistence::queue`); aquí se
//! definen las piezas independientes del almacenamiento: el trabajo, el
//! handler, el registro por clase, el backoff y la captura de pánicos.
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_PRIORITY, DEFAULT_QUEUE};

/// Fila de la cola.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: i64,
    pub queue: String,
    pub priority: i16,
    pub run_at: DateTime<Utc>,
    pub class: String,
    pub args: serde_json::Value,
    pub error_count: i32,
    pub last_error: Option<String>,
}

impl QueueJob {
    pub fn decode_args<T: serde::de::DeserializeOwned>(&self) -> Result<T, JobError> {
        serde_json::from_value(self.args.clone()).map_err(|e| JobError::new(format!("invalid args for {}: {e}", self.class)))
    }
}

/// Trabajo a encolar.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueJob {
    pub queue: String,
    pub priority: i16,
    pub run_at: Option<DateTime<Utc>>,
    pub class: String,
    pub args: serde_json::Value,
}

impl NewQueueJob {
    pub fn new(class: &str, args: serde_json::Value) -> Self {
        Self { queue: DEFAULT_QUEUE.to_string(),
               priority: DEFAULT_PRIORITY,
               run_at: None,
               class: class.to_string(),
               args }
    }

    pub fn on_queue(mut self, queue: &str) -> Self {
        self.queue = queue.to_string();
        self
    }
}

/// Error de un handler. `stack` se rellena cuando el handler entró en pánico.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub stack: Option<String>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(),
               stack: None }
    }

    /// Texto que se guarda en `last_error`.
    pub fn to_record(&self) -> String {
        match &self.stack {
            Some(stack) => format!("{}\n{}", self.message, stack),
            None => self.message.clone(),
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &QueueJob) -> Result<(), JobError>;
}

/// Handlers registrados por clase.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(mut self, class: &str, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(class.to_string(), handler);
        self
    }

    pub fn get(&self, class: &str) -> Option<Arc<dyn JobHandler>> { self.handlers.get(class).cloned() }

    pub fn classes(&self) -> Vec<String> {
        let mut v: Vec<String> = self.handlers.keys().cloned().collect();
        v.sort();
        v
    }
}

/// `error_count^4 + 3` segundos.
pub fn backoff(error_count: i32) -> Duration {
    let n = error_count.max(0) as u64;
    Duration::from_secs(n.saturating_pow(4).saturating_add(3))
}

thread_local! {
    static LAST_PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = std::backtrace::Backtrace::force_capture().to_string();
            LAST_PANIC_STACK.with(|s| *s.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Ejecuta el handler convirtiendo un pánico en `JobError` con stack trace.
pub async fn run_guarded(handler: &dyn JobHandler, job: &QueueJob) -> Result<(), JobError> {
    install_panic_hook();
    match AssertUnwindSafe(handler.run(job)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let stack = LAST_PANIC_STACK.with(|s| s.borrow_mut().take());
            Err(JobError { message: format!("panic: {}", panic_message(payload.as_ref())),
                           stack })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panics;

    #[async_trait]
    impl JobHandler for Panics {
        async fn run(&self, _job: &QueueJob) -> Result<(), JobError> { panic!("boom") }
    }

    fn job() -> QueueJob {
        QueueJob { id: 1,
                   queue: String::new(),
                   priority: 100,
                   run_at: Utc::now(),
                   class: "test".into(),
                   args: serde_json::json!({}),
                   error_count: 0,
                   last_error: None }
    }

    #[test]
    fn backoff_grows_quartically() {
        assert_eq!(backoff(0), Duration::from_secs(3));
        assert_eq!(backoff(1), Duration::from_secs(4));
        assert_eq!(backoff(2), Duration::from_secs(19));
        assert_eq!(backoff(3), Duration::from_secs(84));
    }

    #[test]
    fn panic_becomes_job_error_with_stack() {
        let err = tokio_test::block_on(run_guarded(&Panics, &job())).unwrap_err();
        assert_eq!(err.message, "panic: boom");
        assert!(err.stack.is_some());
        assert!(err.to_record().starts_with("panic: boom\n"));
    }

    #[test]
    fn registry_lookup() {
        let reg = HandlerRegistry::new().register("b", Arc::new(Panics)).register("a", Arc::new(Panics));
        assert_eq!(reg.classes(), vec!["a", "b"]);
        assert!(reg.get("c").is_none());
    }
}
