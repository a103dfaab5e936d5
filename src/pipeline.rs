//! Startup sequence and top-level error policy.
//!
//!   dashboard import → backend info → ensure collection → burst → flush
//!   → demo query → (optional read API) → steady ingestion until cancelled
//!
//! Fatal errors (see [`crate::FeedError::is_fatal`]) are returned; the others are
//! logged and the sequence continues.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::FeederConfig;
use crate::dashboard::DashboardProvisioner;
use crate::error::FeedResult;
use crate::generator::SampleGenerator;
use crate::ingest::{BurstReport, Ingestor};
use crate::metrics::IngestMetrics;
use crate::query::{QueryService, SearchPage};
use crate::schema::{ensure_collection, CollectionSpec, Provisioned};
use crate::server;
use crate::store::DocumentStore;
use crate::AppState;

/// What one run did, returned once the steady phase is cancelled.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub provisioned: Provisioned,
    pub burst: BurstReport,
    /// `None` when the demonstration query failed.
    pub demo: Option<SearchPage>,
    pub steady_written: u64,
    pub last_id: u64,
}

pub async fn run(
    config: &FeederConfig,
    store: Arc<dyn DocumentStore>,
    cancel: CancellationToken,
) -> FeedResult<RunSummary> {
    config.validate()?;

    // ── 1. Dashboards (never fatal) ──────────────────────────────
    if let Some(dashboard) = &config.dashboard {
        let result = match DashboardProvisioner::new(dashboard) {
            Ok(provisioner) => provisioner.import().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to set up Kibana dashboards");
        }
    } else {
        info!("no Kibana URL configured, skipping dashboard import");
    }

    // ── 2. Backend ───────────────────────────────────────────────
    match store.info().await {
        Ok(info) => info!(
            backend = info.backend,
            version = info.version.as_deref().unwrap_or("unknown"),
            "connected to backend"
        ),
        Err(e) => warn!(error = %e, "backend did not report its version"),
    }

    // ── 3. Schema ────────────────────────────────────────────────
    let provisioned = ensure_collection(
        store.as_ref(),
        &config.collection_name,
        &CollectionSpec::samples(),
    )
    .await?;

    // ── 4. Burst + flush barrier ─────────────────────────────────
    let metrics = Arc::new(IngestMetrics::new());
    let generator = SampleGenerator::new(config.roster_names.clone())?;
    let mut ingestor = Ingestor::new(store.clone(), config.collection_name.clone(), generator)
        .with_key_scheme(config.key_scheme())
        .with_retry(config.retry_policy())
        .with_metrics(metrics.clone())
        .with_cancellation(cancel.clone());

    let burst = ingestor.run_burst(config.burst_count).await?;
    ingestor.flush().await?;

    let snap = metrics.snapshot();
    info!(
        p50_us = snap.store_latency.p50_us,
        p99_us = snap.store_latency.p99_us,
        max_us = snap.store_latency.max_us,
        writes_per_sec = snap.writes_per_sec,
        "burst write latency"
    );

    // ── 5. Demonstration query ───────────────────────────────────
    let queries = QueryService::new(store.clone(), config.collection_name.clone())
        .with_policy(config.decode_policy())
        .with_metrics(metrics.clone());
    let demo = run_demo_query(&queries, config).await?;

    // ── 6. Read API ──────────────────────────────────────────────
    let server_handle = config.listen.map(|addr| {
        let state = Arc::new(AppState {
            queries: queries.clone(),
            metrics: metrics.clone(),
            counter: ingestor.counter(),
        });
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(addr, state, cancel).await {
                error!(error = %e, "read API stopped");
            }
        })
    });

    // ── 7. Steady ingestion ──────────────────────────────────────
    info!("launching endless data sending");
    let steady = ingestor.run_forever(config.interval(), cancel.clone()).await;

    // Stop the API whether ingestion ended by cancellation or failure.
    cancel.cancel();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }
    let steady_written = steady?;

    Ok(RunSummary {
        provisioned,
        burst,
        demo,
        steady_written,
        last_id: ingestor.counter().current(),
    })
}

/// Logs the post-burst page. A failed query is reported, not fatal.
async fn run_demo_query(
    queries: &QueryService,
    config: &FeederConfig,
) -> FeedResult<Option<SearchPage>> {
    let request = config.demo_query();
    match queries.search(&request).await {
        Ok(page) => {
            info!(took_ms = page.took_ms, "query finished");
            if page.total == 0 {
                info!(creator = %request.filter_value, "found no numbers");
            } else {
                info!(
                    total = page.total,
                    creator = %request.filter_value,
                    "found random numbers"
                );
                for sample in &page.samples {
                    info!(
                        id = sample.id,
                        value = sample.value,
                        created = %sample.created,
                        creator = %sample.creator,
                        "random number"
                    );
                }
            }
            if page.skipped > 0 {
                warn!(skipped = page.skipped, "malformed hits were skipped");
            }
            Ok(Some(page))
        }
        Err(e) if !e.is_fatal() => {
            error!(kind = e.kind(), error = %e, "demonstration query failed");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
