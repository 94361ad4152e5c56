use std::time::Duration;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use crate::config::{MasterConfig, ScheduleConfig};
use crate::enrich::EnrichQueue;
use crate::store::sync::SyncReport;
use crate::store_manager::StoreHandle;
use crate::wire::{decode_snapshot, Catalog, Completeness};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the gap between fetches, whatever the configuration says
const MAX_FETCH_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Online,
    Offline,
}

/// When to ask the master directory for the next snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub base: Duration,
    pub offset: Duration,
    pub jitter: Duration,
    pub min_spacing: Duration,
}

impl From<&ScheduleConfig> for Schedule {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            base: config.base_period(),
            offset: config.offset(),
            jitter: config.jitter(),
            min_spacing: config.min_retry_spacing(),
        }
    }
}

impl Schedule {
    /// base + offset + uniform(0..=jitter), never below the minimum spacing
    /// and never above a day.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };
        self.base
            .saturating_add(self.offset)
            .saturating_add(jitter)
            .max(self.min_spacing)
            .min(MAX_FETCH_DELAY)
    }
}

/// Everything a session needs besides the socket.
pub struct Session {
    pub master: MasterConfig,
    pub query: Vec<u8>,
    pub schedule: Schedule,
    pub catalog: Catalog,
    pub store: StoreHandle,
    pub enrich: Option<EnrichQueue>,
    pub status_tx: watch::Sender<SessionStatus>,
}

impl Session {
    /// Session lifecycle loop. Fetches immediately, then on every scheduled
    /// trigger. Snapshots are handled one at a time in arrival order.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut rng = StdRng::from_entropy();
        let mut socket: Option<Socket> = None;

        let next_fetch = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_fetch);

        loop {
            tokio::select! {
                () = &mut next_fetch => {
                    self.trigger(&mut socket).await;
                    let delay = self.schedule.next_delay(&mut rng);
                    tracing::debug!("Next fetch in {:?}", delay);
                    next_fetch.as_mut().reset(Instant::now() + delay);
                }
                msg = next_message(&mut socket) => {
                    match msg {
                        Some(Ok(Message::Binary(payload))) => {
                            tracing::info!(bytes = payload.len(), "Got server list payload");
                            if let Err(e) = self.handle_snapshot(&payload).await {
                                tracing::error!("Failed to synchronize snapshot: {:#}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::warn!(?frame, "Master closed the connection");
                            self.go_offline(&mut socket);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("Transport failure: {}", e);
                            self.go_offline(&mut socket);
                        }
                        None => {
                            tracing::warn!("Master connection ended");
                            self.go_offline(&mut socket);
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Session shutting down");
                    if let Some(mut s) = socket.take() {
                        let _ = s.close(None).await;
                    }
                    self.status_tx.send_replace(SessionStatus::Offline);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Connect if offline, otherwise ask the open connection for a fresh list.
    async fn trigger(&self, socket: &mut Option<Socket>) {
        tracing::info!("Getting server list...");

        let resend = match socket.as_mut() {
            Some(s) => Some(s.send(Message::Binary(self.query.clone())).await),
            None => None,
        };

        match resend {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::warn!("Transport failure while requesting list: {}", e);
                self.go_offline(socket);
            }
            None => {
                self.status_tx.send_replace(SessionStatus::Connecting);
                match connect(&self.master, &self.query).await {
                    Ok(s) => {
                        tracing::info!(url = %self.master.url, "status=online");
                        *socket = Some(s);
                        self.status_tx.send_replace(SessionStatus::Online);
                    }
                    Err(e) => {
                        tracing::warn!("status=offline: {:#}", e);
                        self.status_tx.send_replace(SessionStatus::Offline);
                    }
                }
            }
        }
    }

    fn go_offline(&self, socket: &mut Option<Socket>) {
        *socket = None;
        tracing::warn!("status=offline");
        self.status_tx.send_replace(SessionStatus::Offline);
    }

    async fn handle_snapshot(&self, payload: &[u8]) -> Result<SyncReport> {
        process_snapshot(payload, &self.catalog, &self.store, self.enrich.as_ref()).await
    }
}

/// Decode one snapshot payload and reconcile the store against it.
pub async fn process_snapshot(
    payload: &[u8],
    catalog: &Catalog,
    store: &StoreHandle,
    enrich: Option<&EnrichQueue>,
) -> Result<SyncReport> {
    let snapshot = decode_snapshot(payload, catalog);
    let accepted = snapshot.records.len();
    let rejected = snapshot.rejected;
    if let Completeness::Partial(e) = &snapshot.completeness {
        tracing::warn!(accepted, "Partial snapshot, skipping prune: {}", e);
    }

    let report = store.sync(snapshot).await?;

    if let Some(queue) = enrich {
        queue.submit(report.needs_enrichment.iter().cloned());
    }

    tracing::info!(
        accepted,
        rejected,
        pruned = report.pruned.unwrap_or(0),
        "Got server list!"
    );
    Ok(report)
}

async fn connect(master: &MasterConfig, query: &[u8]) -> Result<Socket> {
    let mut request = master
        .url
        .as_str()
        .into_client_request()
        .with_context(|| format!("Invalid master url {}", master.url))?;
    if let Some(protocol) = master.subprotocol.as_deref().filter(|p| !p.is_empty()) {
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(protocol).context("Invalid subprotocol")?,
        );
    }

    let (mut socket, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
        .await
        .context("Timed out connecting to master")?
        .context("Failed to connect to master")?;

    socket
        .send(Message::Text(master.auth.clone()))
        .await
        .context("Failed to send credentials")?;
    socket
        .send(Message::Binary(query.to_vec()))
        .await
        .context("Failed to send query")?;

    Ok(socket)
}

async fn next_message(
    socket: &mut Option<Socket>,
) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}
