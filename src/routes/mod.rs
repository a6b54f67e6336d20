// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::{Any, CorsLayer};

use crate::models::RecordEvent;
use crate::store::SqliteStore;
use crate::subsample_worker::RunRequest;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) records_tx: broadcast::Sender<RecordEvent>,
    pub(crate) run_tx: mpsc::Sender<RunRequest>,
}

pub fn app(
    store: Arc<SqliteStore>,
    records_tx: broadcast::Sender<RecordEvent>,
    run_tx: mpsc::Sender<RunRequest>,
) -> Router {
    let state = AppState {
        store,
        records_tx,
        run_tx,
    };
    Router::new()
        .route("/", get(|| async { "wxserver: weather telemetry" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route(
            "/api/packets/{measurement}",
            post(http::ingest_packet).get(http::query_packets),
        )
        .route("/api/subsample/run", post(http::run_subsampling)) // POST /api/subsample/run
        .route("/ws/records", get(ws::ws_records)) // WS /ws/records
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
