use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::Result;
use shared::types::StoredServer;
use crate::store::{db::CatalogDb, hash, sync::{self, SyncReport}};
use crate::wire::DecodedSnapshot;

/// Commands sent to the store thread
pub enum StoreCommand {
    Sync(DecodedSnapshot, oneshot::Sender<Result<SyncReport>>),
    SetCountryCode {
        id: String,
        country_code: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    GetAll(oneshot::Sender<Result<Vec<StoredServer>>>),
    GetOne(String, oneshot::Sender<Result<Option<StoredServer>>>),
    Shutdown,
}

/// Handle to the single thread that owns the catalog database.
/// Commands run one at a time, so synchronization passes never interleave.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn the store thread with the given database
    pub fn spawn(db: CatalogDb, hash_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        // Publish a new digest only when it differs from the current one
        let recompute_hash = |db: &CatalogDb, hash_tx: &watch::Sender<String>| {
            match db.get_all_servers() {
                Ok(servers) => {
                    let new_hash = hash::compute_hash(&servers);
                    let changed = hash_tx.send_if_modified(|current| {
                        if *current == new_hash {
                            false
                        } else {
                            *current = new_hash;
                            true
                        }
                    });
                    if !changed {
                        tracing::debug!("Catalog unchanged");
                    }
                }
                Err(e) => tracing::error!("Failed to read catalog for hashing: {}", e),
            }
        };

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Sync(snapshot, reply) => {
                        let result = sync::apply(&db, &snapshot);
                        // Upserts may have landed even if the pass failed midway
                        recompute_hash(&db, &hash_tx);
                        let _ = reply.send(result);
                    }
                    StoreCommand::SetCountryCode { id, country_code, reply } => {
                        let result = db.set_country_code(&id, &country_code);
                        if matches!(&result, Ok(true)) {
                            recompute_hash(&db, &hash_tx);
                        }
                        let _ = reply.send(result);
                    }
                    StoreCommand::GetAll(reply) => {
                        let _ = reply.send(db.get_all_servers());
                    }
                    StoreCommand::GetOne(id, reply) => {
                        let _ = reply.send(db.get_server(&id));
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Synchronize the catalog against one decoded snapshot
    pub async fn sync(&self, snapshot: DecodedSnapshot) -> Result<SyncReport> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::Sync(snapshot, reply)).await?;
        rx.await?
    }

    /// Store a country code for a server that has none yet
    pub async fn set_country_code(&self, id: String, country_code: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::SetCountryCode { id, country_code, reply }).await?;
        rx.await?
    }

    /// Get all servers
    pub async fn get_all(&self) -> Result<Vec<StoredServer>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::GetAll(reply)).await?;
        rx.await?
    }

    /// Get a single server by id
    pub async fn get_one(&self, id: String) -> Result<Option<StoredServer>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::GetOne(id, reply)).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}
