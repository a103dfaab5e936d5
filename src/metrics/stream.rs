use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

use super::collector::IngestSnapshot;
use crate::AppState;

const DEFAULT_TICK_MS: u64 = 500;
const MIN_TICK_MS: u64 = 100;
const MAX_TICK_MS: u64 = 10_000;

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Push period in milliseconds, clamped to [100, 10000].
    pub every_ms: Option<u64>,
}

impl StreamParams {
    fn tick(&self) -> Duration {
        let ms = self
            .every_ms
            .unwrap_or(DEFAULT_TICK_MS)
            .clamp(MIN_TICK_MS, MAX_TICK_MS);
        Duration::from_millis(ms)
    }
}

// ─── GET /api/metrics ────────────────────────────────────────────

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<IngestSnapshot> {
    Json(state.metrics.snapshot())
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events, event name `ingest`. The event id is the last sample
/// id at snapshot time.
pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let ticks = IntervalStream::new(tokio::time::interval(params.tick()));

    let stream = ticks.map(move |_| {
        let snapshot = state.metrics.snapshot();
        Event::default()
            .event("ingest")
            .id(snapshot.last_id.to_string())
            .json_data(&snapshot)
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
