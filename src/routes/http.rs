// HTTP handlers: packet ingest/query, manual subsampling trigger, version

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::AppState;
use crate::models::{Packet, RawPacket, TagSet};
use crate::policy::ident_ok;
use crate::store::TimeSeriesStore;
use crate::subsample_worker::RunRequest;
use crate::version::{NAME, VERSION};

const DEFAULT_QUERY_LIMIT: u32 = 1440;
const MAX_QUERY_LIMIT: u32 = 100_000;

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// POST /api/packets/{measurement} — store one packet. Null field values
/// are stripped before storage.
pub(super) async fn ingest_packet(
    State(state): State<AppState>,
    Path(measurement): Path<String>,
    Json(raw): Json<RawPacket>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !ident_ok(&measurement) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid measurement name {:?}", measurement),
        ));
    }
    let packet = raw.strip();
    state
        .store
        .insert(&measurement, &packet)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub(super) struct PacketQuery {
    start: Option<i64>,
    stop: Option<i64>,
    platform: Option<String>,
    stream: Option<String>,
    limit: Option<u32>,
}

/// GET /api/packets/{measurement}?start=&stop=&platform=&stream=&limit= —
/// packets in (start, stop], ascending by timestamp.
pub(super) async fn query_packets(
    State(state): State<AppState>,
    Path(measurement): Path<String>,
    Query(params): Query<PacketQuery>,
) -> Result<Json<Vec<Packet>>, (StatusCode, String)> {
    if !ident_ok(&measurement) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("invalid measurement name {:?}", measurement),
        ));
    }
    let mut tag_filter = TagSet::new();
    if let Some(platform) = params.platform {
        tag_filter.insert("platform".into(), platform);
    }
    if let Some(stream) = params.stream {
        tag_filter.insert("stream".into(), stream);
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .min(MAX_QUERY_LIMIT);

    let packets = state
        .store
        .find_packets(&measurement, &tag_filter, params.start, params.stop, limit)
        .await
        .map_err(internal)?;
    Ok(Json(packets))
}

/// POST /api/subsample/run — manual trigger. Goes through the worker's
/// channel so manual and scheduled runs never overlap.
pub(super) async fn run_subsampling(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (reply, result) = tokio::sync::oneshot::channel();
    state
        .run_tx
        .send(RunRequest { reply })
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "subsample worker is not running".to_string(),
            )
        })?;
    let summaries = result.await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "subsample worker dropped the request".to_string(),
        )
    })?;
    Ok(Json(summaries))
}

fn internal(e: crate::store::StoreError) -> (StatusCode, String) {
    tracing::warn!(error = %e, "store error serving request");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
