use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use crate::session::SessionStatus;
use crate::store_manager::StoreHandle;
use shared::protocol::API_PREFIX;
use shared::types::StoredServer;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub hash_rx: watch::Receiver<String>,
    pub status_rx: watch::Receiver<SessionStatus>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/servers", get(get_servers))
        .route("/servers/hash", get(get_hash))
        .route("/servers/:id", get(get_server))
        .route("/status", get(get_status));

    Router::new().nest(API_PREFIX, v1).with_state(state)
}

async fn get_servers(
    State(state): State<AppState>,
) -> Result<Json<Vec<StoredServer>>, StatusCode> {
    state
        .store
        .get_all()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query servers: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(*state.status_rx.borrow())
}

async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredServer>, StatusCode> {
    state
        .store
        .get_one(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to query server: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
