use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::summary::LatencySummary;
use super::{Phase, WriteObservation};

// ─── Configuration ───────────────────────────────────────────────

/// How many individual writes we keep for the live feed
const MAX_RECENT_WRITES: usize = 100;

/// Timeline resolution (one point per window)
const TIMELINE_WINDOW_MS: u64 = 1_000;

/// Oldest timeline points are dropped past this many windows
const MAX_TIMELINE_POINTS: usize = 3_600;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe ingest metrics.
/// The ingestion loop and query path record, the API reads snapshots.
pub struct IngestMetrics {
    inner: Mutex<Inner>,
}

/// A single entry in the live write feed.
#[derive(Debug, Clone, Serialize)]
pub struct WriteRecord {
    pub timestamp_ms: u64,
    pub id: u64,
    pub creator: String,
    pub value: f64,
    pub phase: Phase,
    pub store_us: u64,
    pub attempts: u32,
    pub success: bool,
}

/// One aggregated point on the timeline (per window).
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub timestamp_ms: u64,
    pub writes: u64,
    pub avg_store_us: f64,
}

/// Read-only view of everything recorded so far.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSnapshot {
    pub store_latency: LatencySummary,
    pub query_latency: LatencySummary,

    pub total_writes: u64,
    pub failed_writes: u64,
    pub retried_writes: u64,
    pub burst_writes: u64,
    pub steady_writes: u64,
    pub total_queries: u64,
    pub failed_queries: u64,

    pub last_id: u64,
    pub phase: Option<Phase>,
    pub writes_per_sec: f64,
    pub elapsed_secs: f64,

    /// Successful writes per creator.
    pub by_creator: BTreeMap<String, u64>,
    pub recent_writes: Vec<WriteRecord>,
    pub timeline: Vec<TimelinePoint>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    store_hist: Histogram<u64>,
    query_hist: Histogram<u64>,

    total_writes: u64,
    failed_writes: u64,
    retried_writes: u64,
    burst_writes: u64,
    steady_writes: u64,
    total_queries: u64,
    failed_queries: u64,

    last_id: u64,
    phase: Option<Phase>,
    by_creator: BTreeMap<String, u64>,

    recent_writes: VecDeque<WriteRecord>,
    timeline: VecDeque<TimelinePoint>,
    current_window: Option<Window>,

    start_time: Option<Instant>,
}

/// Running totals for the current timeline window.
struct Window {
    start_ms: u64,
    store_sum: u64,
    count: u64,
}

impl Window {
    fn point(&self) -> TimelinePoint {
        TimelinePoint {
            timestamp_ms: self.start_ms,
            writes: self.count,
            avg_store_us: self.store_sum as f64 / self.count.max(1) as f64,
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation")
}

// ─── IngestMetrics impl ──────────────────────────────────────────

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Record the final outcome of one write.
    pub fn record_write(&self, obs: WriteObservation) {
        self.inner.lock().record_write(obs);
    }

    /// Record one search round-trip.
    pub fn record_query(&self, elapsed_us: u64, success: bool) {
        let mut inner = self.inner.lock();
        inner.total_queries += 1;
        if success {
            let _ = inner.query_hist.record(elapsed_us.max(1));
        } else {
            inner.failed_queries += 1;
        }
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        self.inner.lock().snapshot()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            store_hist: new_histogram(),
            query_hist: new_histogram(),
            total_writes: 0,
            failed_writes: 0,
            retried_writes: 0,
            burst_writes: 0,
            steady_writes: 0,
            total_queries: 0,
            failed_queries: 0,
            last_id: 0,
            phase: None,
            by_creator: BTreeMap::new(),
            recent_writes: VecDeque::with_capacity(MAX_RECENT_WRITES + 1),
            timeline: VecDeque::new(),
            current_window: None,
            start_time: None,
        }
    }

    fn record_write(&mut self, obs: WriteObservation) {
        // Lazily set the anchor on the very first write
        let start = *self.start_time.get_or_insert_with(Instant::now);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        self.total_writes += 1;
        self.phase = Some(obs.phase);
        self.last_id = self.last_id.max(obs.id);
        if obs.attempts > 1 {
            self.retried_writes += 1;
        }

        if obs.success {
            let _ = self.store_hist.record(obs.store_us.max(1));
            *self.by_creator.entry(obs.creator.clone()).or_default() += 1;
            match obs.phase {
                Phase::Burst => self.burst_writes += 1,
                Phase::Steady => self.steady_writes += 1,
            }
            self.push_to_timeline(elapsed_ms, obs.store_us);
        } else {
            self.failed_writes += 1;
        }

        self.recent_writes.push_back(WriteRecord {
            timestamp_ms: elapsed_ms,
            id: obs.id,
            creator: obs.creator,
            value: obs.value,
            phase: obs.phase,
            store_us: obs.store_us,
            attempts: obs.attempts,
            success: obs.success,
        });
        if self.recent_writes.len() > MAX_RECENT_WRITES {
            self.recent_writes.pop_front();
        }
    }

    /// Add to the current window, or close it and open a new one.
    fn push_to_timeline(&mut self, elapsed_ms: u64, store_us: u64) {
        let window_start = (elapsed_ms / TIMELINE_WINDOW_MS) * TIMELINE_WINDOW_MS;

        if let Some(w) = &mut self.current_window {
            if w.start_ms == window_start {
                w.store_sum += store_us;
                w.count += 1;
                return;
            }
        }

        if let Some(done) = self.current_window.take() {
            self.timeline.push_back(done.point());
            if self.timeline.len() > MAX_TIMELINE_POINTS {
                self.timeline.pop_front();
            }
        }
        self.current_window = Some(Window {
            start_ms: window_start,
            store_sum: store_us,
            count: 1,
        });
    }

    fn snapshot(&self) -> IngestSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let successful = self.burst_writes + self.steady_writes;
        let writes_per_sec = if elapsed_secs > 0.0 {
            successful as f64 / elapsed_secs
        } else {
            0.0
        };

        // Include the current (partial) window
        let mut timeline: Vec<TimelinePoint> = self.timeline.iter().cloned().collect();
        if let Some(w) = &self.current_window {
            timeline.push(w.point());
        }

        IngestSnapshot {
            store_latency: LatencySummary::from_histogram(&self.store_hist),
            query_latency: LatencySummary::from_histogram(&self.query_hist),
            total_writes: self.total_writes,
            failed_writes: self.failed_writes,
            retried_writes: self.retried_writes,
            burst_writes: self.burst_writes,
            steady_writes: self.steady_writes,
            total_queries: self.total_queries,
            failed_queries: self.failed_queries,
            last_id: self.last_id,
            phase: self.phase,
            writes_per_sec,
            elapsed_secs,
            by_creator: self.by_creator.clone(),
            recent_writes: self.recent_writes.iter().cloned().collect(),
            timeline,
        }
    }
}
