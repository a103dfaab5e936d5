use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FeedError, FeedResult};
use crate::generator::SampleGenerator;
use crate::metrics::{IngestMetrics, Phase, WriteObservation};
use crate::model::{Sample, SampleId};
use crate::store::DocumentStore;

/// Log a progress line every this many burst writes.
const BURST_PROGRESS_EVERY: u64 = 1_000;

// ─── Identifier allocation ───────────────────────────────────────

/// Process-local id source. Only the ingestion loop allocates; anyone holding
/// the `Arc` may read the last assigned id.
#[derive(Debug, Default)]
pub struct SampleCounter(AtomicU64);

impl SampleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id; the first call returns 1.
    pub fn next(&self) -> SampleId {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last id handed out, 0 before the first.
    pub fn current(&self) -> SampleId {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a sample id becomes a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScheme {
    /// The decimal id. A restarted process overwrites earlier documents.
    Counter,
    /// `<run id>-<id>`: stable within a run, distinct across restarts.
    RunScoped(Uuid),
}

impl KeyScheme {
    pub fn run_scoped() -> Self {
        Self::RunScoped(Uuid::new_v4())
    }

    pub fn key(&self, id: SampleId) -> String {
        match self {
            Self::Counter => id.to_string(),
            Self::RunScoped(run) => format!("{run}-{id}"),
        }
    }
}

/// Write attempts per sample. Retries resend the same key and body, so a
/// write that landed but was reported failed is simply overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    /// Single attempt: the first failure is final.
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Outcome of [`Ingestor::run_burst`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BurstReport {
    pub written: u64,
    pub first_id: Option<SampleId>,
    pub last_id: Option<SampleId>,
    /// Samples written per creator.
    pub by_creator: BTreeMap<String, u64>,
    pub elapsed_ms: u64,
}

// ─── Ingestor ────────────────────────────────────────────────────

/// Generates samples and writes them, one at a time, to a collection.
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    collection: String,
    generator: SampleGenerator,
    counter: Arc<SampleCounter>,
    keys: KeyScheme,
    retry: RetryPolicy,
    metrics: Arc<IngestMetrics>,
    /// Aborts retry backoff outside `run_forever`.
    cancel: CancellationToken,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        generator: SampleGenerator,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            generator,
            counter: Arc::new(SampleCounter::new()),
            keys: KeyScheme::Counter,
            retry: RetryPolicy::default(),
            metrics: Arc::new(IngestMetrics::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_key_scheme(mut self, keys: KeyScheme) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<IngestMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Token that cuts retry backoff short during the burst.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn counter(&self) -> Arc<SampleCounter> {
        self.counter.clone()
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        self.metrics.clone()
    }

    pub fn key_scheme(&self) -> &KeyScheme {
        &self.keys
    }

    /// Allocates the next id, generates a sample and writes it.
    pub async fn ingest_one(&mut self, phase: Phase) -> FeedResult<Sample> {
        let cancel = self.cancel.clone();
        self.ingest_with(phase, &cancel).await
    }

    async fn ingest_with(&mut self, phase: Phase, cancel: &CancellationToken) -> FeedResult<Sample> {
        let id = self.counter.next();
        let sample = self.generator.generate(id);
        self.write(&sample, phase, cancel).await?;
        Ok(sample)
    }

    /// Cancellation during backoff gives up on the sample with the last error.
    async fn write(
        &self,
        sample: &Sample,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> FeedResult<()> {
        let key = self.keys.key(sample.id);
        let body = sample.to_document();

        let t0 = Instant::now();
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self
                .store
                .index_document(&self.collection, &key, &body)
                .await
            {
                Ok(()) => break Ok(()),
                Err(e) if attempts < self.retry.attempts && !cancel.is_cancelled() => {
                    warn!(key = %key, attempt = attempts, error = %e, "write failed, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Err(e),
                        _ = tokio::time::sleep(self.retry.backoff) => {}
                    }
                }
                Err(e) => break Err(e),
            }
        };
        let store_us = t0.elapsed().as_micros() as u64;

        self.metrics.record_write(WriteObservation {
            id: sample.id,
            creator: sample.creator.clone(),
            value: sample.value,
            phase,
            store_us,
            attempts,
            success: outcome.is_ok(),
        });

        outcome.map_err(|source| FeedError::Write {
            collection: self.collection.clone(),
            key,
            source,
        })
    }

    /// Writes `count` samples back to back. Stops at the first failed write.
    pub async fn run_burst(&mut self, count: u64) -> FeedResult<BurstReport> {
        info!(count, collection = %self.collection, "sending burst");
        let started = Instant::now();
        let mut report = BurstReport::default();

        for _ in 0..count {
            let sample = self.ingest_one(Phase::Burst).await?;
            report.first_id.get_or_insert(sample.id);
            report.last_id = Some(sample.id);
            *report.by_creator.entry(sample.creator).or_default() += 1;
            report.written += 1;

            if report.written % BURST_PROGRESS_EVERY == 0 {
                debug!(written = report.written, count, "burst progress");
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            written = report.written,
            elapsed_ms = report.elapsed_ms,
            "burst sent"
        );
        Ok(report)
    }

    /// Makes every write so far visible to search.
    pub async fn flush(&self) -> FeedResult<()> {
        self.store
            .flush(&self.collection)
            .await
            .map_err(|source| FeedError::Flush {
                collection: self.collection.clone(),
                source,
            })?;
        debug!(collection = %self.collection, "flushed");
        Ok(())
    }

    /// One write per `interval` until `cancel` fires, continuing the id
    /// sequence. Returns the number of samples written.
    pub async fn run_forever(
        &mut self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> FeedResult<u64> {
        info!(
            interval_ms = interval.as_millis() as u64,
            next_id = self.counter.current() + 1,
            "steady ingestion started"
        );

        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first write waits a full interval.
        ticker.tick().await;

        let mut written = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let sample = self.ingest_with(Phase::Steady, &cancel).await?;
            written += 1;
            debug!(id = sample.id, creator = %sample.creator, value = sample.value, "sample written");
        }

        info!(written, last_id = self.counter.current(), "steady ingestion stopped");
        Ok(written)
    }
}
