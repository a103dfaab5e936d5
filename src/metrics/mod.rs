pub mod collector;
pub mod stream;
pub mod summary;

use serde::Serialize;

pub use collector::{IngestMetrics, IngestSnapshot};
pub use summary::LatencySummary;

/// Which ingestion phase produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Initial bounded run, no delay between writes.
    Burst,
    /// Perpetual one-per-interval run.
    Steady,
}

/// A single write observation pushed by the ingestion loop.
#[derive(Debug, Clone)]
pub struct WriteObservation {
    pub id: u64,
    pub creator: String,
    pub value: f64,
    pub phase: Phase,
    /// Microseconds spent in the backend round-trip(s), retries included
    pub store_us: u64,
    /// Attempts used; 1 unless a retry policy is configured
    pub attempts: u32,
    /// false when the write was finally given up
    pub success: bool,
}
