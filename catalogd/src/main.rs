mod api;
mod config;
mod enrich;
mod session;
mod store;
mod store_manager;
mod wire;

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::enrich::geo::RangeTable;
use crate::enrich::EnrichQueue;
use crate::session::{Schedule, Session, SessionStatus};
use crate::store::db::CatalogDb;
use crate::store_manager::StoreHandle;
use crate::wire::Catalog;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("catalogd=info"))
        )
        .init();

    tracing::info!("Starting catalogd");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/catalogd/catalogd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let query = config.master.query_payload()?;

    let db = CatalogDb::open(&config.store.db_path)?;
    tracing::info!("Opened database at {:?}", config.store.db_path);

    let initial_servers = db.get_all_servers()?;
    let initial_hash = store::hash::compute_hash(&initial_servers);
    tracing::info!(servers = initial_servers.len(), "Initial catalog hash: {}", initial_hash);

    let (hash_tx, hash_rx) = watch::channel(initial_hash);
    let (status_tx, status_rx) = watch::channel(SessionStatus::Offline);

    let store = StoreHandle::spawn(db, hash_tx);

    let cancel = CancellationToken::new();

    // Enrichment is optional; without a range table servers simply stay unenriched
    let (enrich_queue, enrich_handle) = match &config.enrichment.geo_ranges {
        Some(path) => {
            let table = RangeTable::load(path)?;
            tracing::info!(ranges = table.len(), "Loaded country ranges from {}", path.display());
            let (queue, rx) = EnrichQueue::new(config.enrichment.queue_depth);
            let worker_store = store.clone();
            let worker_cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = enrich::worker::run(worker_store, Arc::new(table), rx, worker_cancel).await {
                    tracing::error!("Enrichment worker error: {}", e);
                }
            });
            (Some(queue), Some(handle))
        }
        None => {
            tracing::info!("No country ranges configured, enrichment disabled");
            (None, None)
        }
    };

    let session = Session {
        schedule: Schedule::from(&config.schedule),
        master: config.master.clone(),
        query,
        catalog: Catalog::standard(),
        store: store.clone(),
        enrich: enrich_queue,
        status_tx,
    };
    let session_cancel = cancel.clone();
    let session_handle = tokio::spawn(async move {
        if let Err(e) = session.run(session_cancel).await {
            tracing::error!("Session error: {}", e);
        }
    });

    let app_state = api::routes::AppState {
        store: store.clone(),
        hash_rx,
        status_rx,
    };
    let app = api::routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(session_handle, server_handle);
    if let Some(handle) = enrich_handle {
        let _ = handle.await;
    }

    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
