//! Cola de trabajos durable sobre `que_jobs`.
//!
//! Reclamar un trabajo combina `FOR UPDATE SKIP LOCKED` con un advisory lock
//! de sesión sobre `job_id`: el lock de fila sólo dura la transacción de
//! selección; el advisory lock protege la ejecución completa. Tras tomarlo se
//! comprueba que la fila sigue existiendo (otro worker pudo terminarla entre
//! el snapshot y el lock).

use std::sync::Arc;
use std::time::Duration;

use flotilla_core::{backoff, run_guarded, HandlerRegistry, JobError, NewQueueJob, QueueJob};
use log::{debug, error, info, warn};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgConnection, Postgres, Row};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Db;
use crate::error::{PersistenceError, Result};
use crate::queries::*;

// Reintentos de lock antes de dar la ronda por vacía.
const LOCK_ATTEMPTS: usize = 10;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Inserta un trabajo usando la conexión dada; dentro de una transacción el
/// trabajo sólo es visible tras el commit.
pub(crate) async fn enqueue(conn: &mut PgConnection, job: &NewQueueJob) -> Result<i64> {
    let row = sqlx::query(QUE_INSERT_JOB).bind(&job.queue)
                                         .bind(job.priority)
                                         .bind(job.run_at)
                                         .bind(&job.class)
                                         .bind(&job.args)
                                         .fetch_one(&mut *conn)
                                         .await?;
    let id: i64 = row.try_get("job_id")?;
    debug!("queue:enqueued id={id} class={} queue={:?}", job.class, job.queue);
    Ok(id)
}

fn queue_job_from_row(row: &PgRow) -> Result<QueueJob> {
    Ok(QueueJob { id: row.try_get("job_id")?,
                  queue: row.try_get("queue")?,
                  priority: row.try_get("priority")?,
                  run_at: row.try_get("run_at")?,
                  class: row.try_get("job_class")?,
                  args: row.try_get("args")?,
                  error_count: row.try_get("error_count")?,
                  last_error: row.try_get("last_error")? })
}

/// Trabajo reclamado. Conserva la conexión que posee el advisory lock hasta
/// `done`/`error`; si se suelta sin pasar por ellos, la conexión se cierra y
/// el lock muere con la sesión.
pub struct LockedJob {
    pub job: QueueJob,
    conn: Option<PoolConnection<Postgres>>,
}

impl LockedJob {
    fn new(job: QueueJob, conn: PoolConnection<Postgres>) -> Self { Self { job, conn: Some(conn) } }

    fn into_parts(mut self) -> (QueueJob, Option<PoolConnection<Postgres>>) {
        let conn = self.conn.take();
        (self.job.clone(), conn)
    }
}

impl Drop for LockedJob {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("queue:lock_abandoned id={}", self.job.id);
            drop(conn.detach());
        }
    }
}

#[derive(Clone)]
pub struct PgQueue {
    db: Arc<Db>,
    queue: String,
    poll_interval: Duration,
}

impl PgQueue {
    pub fn new(db: Arc<Db>, queue: &str) -> Self {
        Self { db,
               queue: queue.to_string(),
               poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn enqueue(&self, job: NewQueueJob) -> Result<i64> {
        let mut conn = self.db.pool().acquire().await?;
        enqueue(&mut conn, &job).await
    }

    /// Reclama el siguiente trabajo listo de la cola, o `None` si no hay.
    pub async fn lock_job(&self) -> Result<Option<LockedJob>> {
        let mut conn = self.db.pool().acquire().await?;
        // Filas con advisory lock de otra sesión: se saltan en el siguiente intento.
        let mut skipped: Vec<i64> = Vec::new();
        for _ in 0..LOCK_ATTEMPTS {
            let mut tx = Connection::begin(&mut *conn).await?;
            let row = sqlx::query(QUE_LOCK_JOB).bind(&self.queue).bind(&skipped).fetch_optional(&mut *tx).await?;
            let Some(row) = row else {
                tx.commit().await?;
                return Ok(None);
            };
            let job = queue_job_from_row(&row)?;
            let locked: bool = sqlx::query(QUE_ADVISORY_LOCK).bind(job.id).fetch_one(&mut *tx).await?.try_get(0)?;
            let committed = tx.commit().await.map_err(PersistenceError::from);
            if !locked {
                committed?;
                skipped.push(job.id);
                continue;
            }
            // Con el lock tomado, todo error pasa por `release`.
            let exists = match committed {
                Ok(()) => job_exists(&mut conn, &job).await,
                Err(e) => Err(e),
            };
            match exists {
                Ok(true) => return Ok(Some(LockedJob::new(job, conn))),
                Ok(false) => {
                    if let Err(e) = unlock(&mut conn, job.id).await {
                        discard(conn).await;
                        return Err(e);
                    }
                    debug!("queue:vanished id={}", job.id);
                    skipped.push(job.id);
                }
                Err(e) => return release(conn, job.id, Err(e)).await.map(|()| None),
            }
        }
        Ok(None)
    }

    /// Borra el trabajo y libera el lock. Borrar dos veces es un no-op.
    pub async fn done(&self, locked: LockedJob) -> Result<()> {
        let (job, Some(mut conn)) = locked.into_parts() else {
            return Ok(());
        };
        let outcome = sqlx::query(QUE_DESTROY_JOB).bind(&job.queue)
                                                  .bind(job.priority)
                                                  .bind(job.run_at)
                                                  .bind(job.id)
                                                  .execute(&mut *conn)
                                                  .await
                                                  .map(|_| ())
                                                  .map_err(PersistenceError::from);
        release(conn, job.id, outcome).await
    }

    /// Registra el fallo y reprograma con backoff `error_count^4 + 3` s.
    pub async fn error(&self, locked: LockedJob, err: &JobError) -> Result<()> {
        let (job, Some(mut conn)) = locked.into_parts() else {
            return Ok(());
        };
        let count = job.error_count + 1;
        let delay = backoff(count).as_secs() as f64;
        let outcome = sqlx::query(QUE_SET_ERROR).bind(count)
                                          .bind(delay)
                                          .bind(err.to_record())
                                          .bind(&job.queue)
                                          .bind(job.priority)
                                          .bind(job.run_at)
                                          .bind(job.id)
                                          .execute(&mut *conn)
                                          .await
                                          .map(|_| ())
                                          .map_err(PersistenceError::from);
        release(conn, job.id, outcome).await
    }

    /// Ejecuta un trabajo si hay alguno listo. Devuelve si trabajó.
    pub async fn work_one(&self, handlers: &HandlerRegistry) -> Result<bool> {
        let Some(locked) = self.lock_job().await? else {
            return Ok(false);
        };
        let job = locked.job.clone();
        let Some(handler) = handlers.get(&job.class) else {
            warn!("queue:unknown_class id={} class={}", job.id, job.class);
            self.error(locked, &JobError::new(format!("unknown job class: {}", job.class))).await?;
            return Ok(true);
        };
        info!("queue:start id={} class={} attempt={}", job.id, job.class, job.error_count + 1);
        match run_guarded(handler.as_ref(), &job).await {
            Ok(()) => {
                info!("queue:done id={} class={}", job.id, job.class);
                self.done(locked).await?;
            }
            Err(e) => {
                error!("queue:failed id={} class={} err={}", job.id, job.class, e.message);
                self.error(locked, &e).await?;
            }
        }
        Ok(true)
    }

    /// Bucle de worker hasta que se cancele `cancel`.
    pub fn spawn_worker(&self, handlers: Arc<HandlerRegistry>, cancel: CancellationToken) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            info!("queue:worker_started queue={:?} classes={:?}", queue.queue, handlers.classes());
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let worked = match queue.work_one(&handlers).await {
                    Ok(worked) => worked,
                    Err(e) => {
                        warn!("queue:poll_error err={e}");
                        false
                    }
                };
                if worked {
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(queue.poll_interval) => {}
                }
            }
            info!("queue:worker_stopped queue={:?}", queue.queue);
        })
    }
}

async fn job_exists(conn: &mut PgConnection, job: &QueueJob) -> Result<bool> {
    Ok(sqlx::query(QUE_CHECK_JOB).bind(&job.queue)
                                 .bind(job.priority)
                                 .bind(job.run_at)
                                 .bind(job.id)
                                 .fetch_one(&mut *conn)
                                 .await?
                                 .try_get(0)?)
}

async fn unlock(conn: &mut PgConnection, job_id: i64) -> Result<()> {
    sqlx::query(QUE_ADVISORY_UNLOCK).bind(job_id).execute(&mut *conn).await?;
    Ok(())
}

/// Libera el advisory lock y devuelve `outcome`. Si el unlock falla, la
/// conexión no vuelve al pool.
async fn release(mut conn: PoolConnection<Postgres>, job_id: i64, outcome: Result<()>) -> Result<()> {
    match unlock(&mut conn, job_id).await {
        Ok(()) => outcome,
        Err(e) => {
            warn!("queue:unlock_failed id={job_id} err={e}");
            discard(conn).await;
            outcome.and(Err(e))
        }
    }
}

/// Cierra la conexión fuera del pool; los locks de sesión se van con ella.
async fn discard(conn: PoolConnection<Postgres>) {
    if let Err(e) = conn.detach().close().await {
        debug!("queue:close_failed err={e}");
    }
}
