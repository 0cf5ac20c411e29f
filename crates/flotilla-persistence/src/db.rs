//! Pool de conexiones y helpers de ejecución.
//!
//! - Al abrir el pool se aplican primero las migraciones sobre una conexión
//!   suelta; después se construye el pool.
//! - Cada conexión física prepara el catálogo completo de `queries` en
//!   `after_connect`; las sentencias quedan en la caché de la conexión y las
//!   consultas posteriores con el mismo SQL las reutilizan.
//! - Un `NOTIFY schema_migrations` de otro proceso provoca `reset()`: se
//!   construye un pool nuevo (que re-prepara contra el esquema actual) y se
//!   cierra el anterior.

use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use sqlx::postgres::{PgConnectOptions, PgListener, PgPoolOptions};
use sqlx::{ConnectOptions, Executor, PgPool, Postgres, Transaction};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DbConfig;
use crate::error::{PersistenceError, Result};
use crate::migrations::{run_pending_migrations, MIGRATION_CHANNEL};
use crate::queries::CATALOG;

// El catálogo entero debe caber en la caché de sentencias.
const STATEMENT_CACHE_CAPACITY: usize = 256;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle compartido a la base de datos.
pub struct Db {
    cfg: DbConfig,
    options: PgConnectOptions,
    pool: RwLock<PgPool>,
}

impl Db {
    /// Migra y abre el pool.
    pub async fn connect(cfg: DbConfig) -> Result<Arc<Self>> {
        let options = PgConnectOptions::from_str(&cfg.url).map_err(|e| PersistenceError::Config(format!("DATABASE_URL: {e}")))?
                                                          .statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        {
            let mut conn = options.connect().await?;
            let applied = run_pending_migrations(&mut conn).await?;
            if !applied.is_empty() {
                info!("db:migrated versions={applied:?}");
            }
        }
        let pool = build_pool(&cfg, &options).await?;
        info!("db:connected min={} max={}", cfg.min_connections, cfg.max_connections);
        Ok(Arc::new(Self { cfg,
                           options,
                           pool: RwLock::new(pool) }))
    }

    /// Pool vigente. `PgPool` es un handle barato de clonar.
    pub fn pool(&self) -> PgPool {
        match self.pool.read() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Transacción read-committed (nivel por defecto de Postgres).
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> { Ok(self.pool().begin().await?) }

    pub fn connect_options(&self) -> &PgConnectOptions { &self.options }

    /// Comprobación de salud: un round-trip trivial.
    pub async fn ping(&self) -> Result<()> {
        let pool = self.pool();
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Sustituye el pool por uno nuevo y cierra el viejo.
    pub async fn reset(&self) -> Result<()> {
        let fresh = build_pool(&self.cfg, &self.options).await?;
        let old = {
            let mut guard = self.pool.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *guard, fresh)
        };
        old.close().await;
        info!("db:pool_reset");
        Ok(())
    }

    /// Escucha `schema_migrations` y reinicia el pool en cada notificación.
    /// La tarea termina al cancelar el token.
    pub fn watch_migrations(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let mut listener = match PgListener::connect_with(&db.pool()).await {
                    Ok(l) => l,
                    Err(e) => {
                        warn!("db:migration_watch connect error={e}");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                        }
                    }
                };
                if let Err(e) = listener.listen(MIGRATION_CHANNEL).await {
                    warn!("db:migration_watch listen error={e}");
                    continue;
                }
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        n = listener.try_recv() => n,
                    };
                    match next {
                        Ok(Some(n)) => {
                            debug!("db:migration_notified version={}", n.payload());
                            if let Err(e) = db.reset().await {
                                error!("db:pool_reset error={e}");
                            }
                        }
                        // Conexión perdida: se reabre el listener.
                        Ok(None) => break,
                        Err(e) => {
                            warn!("db:migration_watch error={e}");
                            break;
                        }
                    }
                }
            }
        })
    }
}

async fn build_pool(cfg: &DbConfig, options: &PgConnectOptions) -> Result<PgPool> {
    let pool = PgPoolOptions::new().min_connections(cfg.min_connections)
                                   .max_connections(cfg.max_connections)
                                   .acquire_timeout(ACQUIRE_TIMEOUT)
                                   .after_connect(|conn, _meta| {
                                       Box::pin(async move {
                                           for (name, sql) in CATALOG {
                                               if let Err(e) = (&mut *conn).prepare(*sql).await {
                                                   error!("db:prepare name={name} error={e}");
                                                   return Err(e);
                                               }
                                           }
                                           Ok(())
                                       })
                                   })
                                   .connect_with(options.clone())
                                   .await?;
    Ok(pool)
}

/// Reintenta `f` ante errores transitorios.
///
/// Política: 3 reintentos con backoff lineal de 15ms, 30ms, 45ms y un
/// `warn!` por intento. No altera la semántica de negocio; sólo repite la
/// unidad de trabajo.
pub async fn with_retry<F, Fut, T>(mut f: F) -> Result<T>
    where F: FnMut() -> Fut,
          Fut: Future<Output = Result<T>>
{
    let mut attempts = 0u64;
    loop {
        match f().await {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * (attempts + 1);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempts += 1;
            }
            r => return r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_gives_up_after_three_retries() {
        let calls = AtomicUsize::new(0);
        let res: Result<()> = with_retry(|| {
                                  calls.fetch_add(1, Ordering::SeqCst);
                                  async { Err(PersistenceError::SerializationConflict) }
                              }).await;
        assert!(matches!(res, Err(PersistenceError::SerializationConflict)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let res: Result<()> = with_retry(|| {
                                  calls.fetch_add(1, Ordering::SeqCst);
                                  async { Err(PersistenceError::CheckViolation("nope".into())) }
                              }).await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
