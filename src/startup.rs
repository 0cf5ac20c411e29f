//! Arranque del proceso: logging, base de datos, listener, workers de la
//! cola y servidor HTTP/gRPC, con apagado ordenado ante SIGINT/SIGTERM.
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use flotilla_adapters::{BlobstoreClient, ClusterClient, DiscoverdClient, RouterClient};
use flotilla_api::ApiState;
use flotilla_core::constants::DEFAULT_QUEUE;
use flotilla_core::EventBroker;
use flotilla_infra::{handler_registry, InfraContext};
use flotilla_persistence::{Db, PgEventListener, PgQueue};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ControllerConfig;
use crate::errors::ControllerError;

static INIT_LOGGING: Once = Once::new();

/// `RUST_LOG` (por defecto `info`). También recoge los registros de `log`
/// de las crates de librería.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
                    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
                    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
                });
}

/// Colaboradores compartidos por la API y los workers.
pub async fn build_context(cfg: &ControllerConfig) -> Result<InfraContext, ControllerError> {
    let db = Db::connect(cfg.db()?).await?;
    let listener = PgEventListener::new(db.clone(), EventBroker::new());
    let discoverd = DiscoverdClient::new(cfg.discoverd_url.clone());
    Ok(InfraContext { db,
                      names: Arc::new(cfg.names()),
                      listener,
                      cluster: ClusterClient::new(discoverd.clone()),
                      discoverd,
                      router: RouterClient::new(cfg.router_url.clone()),
                      blobstore: BlobstoreClient::new(cfg.blobstore_url.clone()),
                      default_domain: cfg.default_route_domain.clone() })
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }
    tracing::info!("shutdown requested");
    cancel.cancel();
}

/// Corre el controlador hasta recibir una señal.
pub async fn run(cfg: ControllerConfig) -> Result<(), ControllerError> {
    let ctx = build_context(&cfg).await?;
    let cancel = CancellationToken::new();

    let migrations = ctx.db.watch_migrations(cancel.clone());
    let handlers = Arc::new(handler_registry(&ctx));
    let queue = PgQueue::new(ctx.db.clone(), DEFAULT_QUEUE);
    let workers: Vec<_> = (0..cfg.worker_concurrency).map(|_| queue.spawn_worker(handlers.clone(), cancel.clone())).collect();
    tracing::info!(workers = workers.len(), "queue workers started");

    let state = ApiState::new(&ctx, cfg.api());
    if cfg.auth_keys.is_empty() {
        tracing::warn!("AUTH_KEY is empty; every authenticated request will be rejected");
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "controller listening");

    let server = axum::serve(listener, flotilla_api::router(state)).with_graceful_shutdown(shutdown_signal(cancel.clone()));
    let served = server.await;
    cancel.cancel();

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "queue worker ended abnormally");
        }
    }
    ctx.listener.shutdown().await;
    if let Err(e) = migrations.await {
        tracing::warn!(error = %e, "migration watcher ended abnormally");
    }
    tracing::info!("controller stopped");
    served.map_err(ControllerError::from)
}
