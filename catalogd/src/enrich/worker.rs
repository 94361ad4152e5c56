use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use shared::protocol::UNKNOWN_COUNTRY;
use crate::enrich::geo::CountryLookup;
use crate::store_manager::StoreHandle;

/// A stored server waiting for a country code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichJob {
    pub id: String,
    pub ip: Ipv4Addr,
}

/// Sending side of the enrichment queue. Never blocks the caller.
#[derive(Clone)]
pub struct EnrichQueue {
    tx: mpsc::Sender<EnrichJob>,
}

impl EnrichQueue {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<EnrichJob>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }

    /// Queue jobs, dropping whatever does not fit. Dropped servers still lack a
    /// code in the store and come back on the next cycle.
    pub fn submit(&self, jobs: impl IntoIterator<Item = (String, Ipv4Addr)>) -> usize {
        let mut dropped = 0;
        for (id, ip) in jobs {
            if self.tx.try_send(EnrichJob { id, ip }).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Enrichment queue full");
        }
        dropped
    }
}

/// Enrichment consumer. Looks up each queued server and records its country,
/// or the unknown sentinel when the lookup fails.
pub async fn run(
    store: StoreHandle,
    lookup: Arc<dyn CountryLookup>,
    mut rx: mpsc::Receiver<EnrichJob>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else {
                    break;
                };
                let country_code = match lookup.lookup(job.ip) {
                    Ok(code) => code,
                    Err(e) => {
                        tracing::debug!(ip = %job.ip, "Country lookup failed: {}", e);
                        UNKNOWN_COUNTRY.to_string()
                    }
                };
                // A repeated job is harmless, the store only fills an empty code
                if let Err(e) = store.set_country_code(job.id, country_code).await {
                    tracing::error!("Failed to store country code: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Enrichment worker shutting down");
                break;
            }
        }
    }

    Ok(())
}
