use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::metrics::Phase;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct IngestStatus {
    /// Last id handed out by the ingestion loop.
    pub last_id: u64,
    pub phase: Option<Phase>,
    pub total_writes: u64,
    pub failed_writes: u64,
    pub writes_per_sec: f64,
    pub collection: String,
}

// ─── GET /api/ingest/status ──────────────────────────────────────

pub async fn ingest_status(State(state): State<Arc<AppState>>) -> Json<IngestStatus> {
    let snap = state.metrics.snapshot();
    Json(IngestStatus {
        last_id: state.counter.current(),
        phase: snap.phase,
        total_writes: snap.total_writes,
        failed_writes: snap.failed_writes,
        writes_per_sec: snap.writes_per_sec,
        collection: state.queries.collection().to_string(),
    })
}
