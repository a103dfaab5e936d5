use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use search_feeder::config::FeederConfig;
use search_feeder::generator::SampleGenerator;
use search_feeder::ingest::Ingestor;
use search_feeder::pipeline;
use search_feeder::query::{QueryService, SearchRequest};
use search_feeder::schema::{ensure_collection, CollectionSpec, Provisioned};
use search_feeder::store::{
    BackendInfo, DocumentStore, MemoryStore, RawSearchResult, SearchQuery, StoreError, StoreResult,
};
use search_feeder::FeedError;

fn roster() -> Vec<String> {
    vec!["Pavel".into(), "John".into()]
}

fn config(burst: u64) -> FeederConfig {
    let mut config = FeederConfig::with_store_url("memory://");
    config.roster_names = roster();
    config.burst_count = burst;
    config.interval_secs = 0.01;
    config
}

async fn provisioned_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::near_real_time());
    ensure_collection(store.as_ref(), "random", &CollectionSpec::samples())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn burst_then_flush_then_query() {
    let store = provisioned_store().await;
    let generator = SampleGenerator::seeded(roster(), 2024).unwrap();
    let mut ingestor = Ingestor::new(store.clone(), "random", generator);
    let queries = QueryService::new(store.clone(), "random");

    let report = ingestor.run_burst(100).await.unwrap();
    let pavel_count = report.by_creator.get("Pavel").copied().unwrap_or(0);

    // Nothing is searchable before the barrier.
    let before = queries
        .search(&SearchRequest::by_creator("Pavel"))
        .await
        .unwrap();
    assert_eq!(before.total, 0);

    ingestor.flush().await.unwrap();

    let page = queries
        .search(&SearchRequest::by_creator("Pavel"))
        .await
        .unwrap();
    assert_eq!(page.total, pavel_count);
    assert!(page.samples.len() <= 15);
    assert_eq!(page.samples.len() as u64, pavel_count.min(15));
    assert!(page.samples.iter().all(|s| s.creator == "Pavel"));
    assert!(page
        .samples
        .windows(2)
        .all(|w| w[0].created <= w[1].created));
}

#[tokio::test]
async fn pages_cover_every_match_exactly_once() {
    let store = provisioned_store().await;
    let generator = SampleGenerator::seeded(roster(), 99).unwrap();
    let mut ingestor = Ingestor::new(store.clone(), "random", generator);
    let report = ingestor.run_burst(100).await.unwrap();
    ingestor.flush().await.unwrap();

    let queries = QueryService::new(store.clone(), "random");
    let john_count = report.by_creator["John"];
    let mut seen = HashSet::new();
    let mut last_created = None;
    let mut offset = 0;

    loop {
        let page = queries
            .search(&SearchRequest::by_creator("John").page(offset, 15))
            .await
            .unwrap();
        assert_eq!(page.total, john_count);
        assert_eq!(page.offset, offset);
        assert!(page.samples.len() <= 15);
        if page.is_empty() {
            break;
        }
        for sample in &page.samples {
            assert!(seen.insert(sample.id), "id {} returned twice", sample.id);
            if let Some(prev) = last_created {
                assert!(prev <= sample.created);
            }
            last_created = Some(sample.created);
        }
        offset += page.samples.len();
    }

    assert_eq!(seen.len() as u64, john_count);
}

#[tokio::test]
async fn unknown_creator_returns_empty_page() {
    let store = provisioned_store().await;
    let mut ingestor = Ingestor::new(
        store.clone(),
        "random",
        SampleGenerator::seeded(roster(), 5).unwrap(),
    );
    ingestor.run_burst(20).await.unwrap();
    ingestor.flush().await.unwrap();

    let page = QueryService::new(store, "random")
        .search(&SearchRequest::by_creator("Julia"))
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert!(page.samples.is_empty());
}

#[tokio::test]
async fn descending_order_reverses_creation_time() {
    let store = provisioned_store().await;
    let mut ingestor = Ingestor::new(
        store.clone(),
        "random",
        SampleGenerator::seeded(roster(), 8).unwrap(),
    );
    ingestor.run_burst(40).await.unwrap();
    ingestor.flush().await.unwrap();

    let page = QueryService::new(store, "random")
        .search(&SearchRequest::by_creator("Pavel").descending())
        .await
        .unwrap();
    assert!(page
        .samples
        .windows(2)
        .all(|w| w[0].created >= w[1].created));
}

#[tokio::test]
async fn full_run_with_cancelled_token_skips_steady_phase() {
    let store = Arc::new(MemoryStore::near_real_time());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = pipeline::run(&config(100), store.clone(), cancel)
        .await
        .unwrap();

    assert_eq!(summary.provisioned, Provisioned::Created);
    assert_eq!(summary.burst.written, 100);
    assert_eq!(summary.steady_written, 0);
    assert_eq!(summary.last_id, 100);
    assert_eq!(store.document_count("random"), 100);

    let demo = summary.demo.expect("demo query succeeds");
    assert_eq!(
        demo.total,
        summary.burst.by_creator.get("Pavel").copied().unwrap_or(0)
    );
    assert!(demo.samples.iter().all(|s| s.creator == "Pavel"));
}

#[tokio::test]
async fn restart_reuses_collection_and_overwrites_counter_keys() {
    let store = Arc::new(MemoryStore::new());
    for expected in [Provisioned::Created, Provisioned::AlreadyExists] {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = pipeline::run(&config(30), store.clone(), cancel)
            .await
            .unwrap();
        assert_eq!(summary.provisioned, expected);
    }
    assert_eq!(store.document_count("random"), 30);
}

#[tokio::test]
async fn steady_phase_runs_until_cancelled() {
    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    let summary = pipeline::run(&config(10), store.clone(), cancel)
        .await
        .unwrap();

    assert!(summary.steady_written >= 1);
    assert_eq!(summary.last_id, 10 + summary.steady_written);
    assert_eq!(
        store.document_count("random") as u64,
        10 + summary.steady_written
    );
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_io() {
    let store = Arc::new(MemoryStore::new());
    let mut bad = config(10);
    bad.roster_names.clear();

    let err = pipeline::run(&bad, store.clone(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::Configuration(_)));
    assert!(!store.exists("random").await.unwrap());
}

/// Accepts the schema but refuses every document.
struct ReadOnlyStore(MemoryStore);

#[async_trait]
impl DocumentStore for ReadOnlyStore {
    async fn info(&self) -> StoreResult<BackendInfo> {
        self.0.info().await
    }
    async fn exists(&self, c: &str) -> StoreResult<bool> {
        self.0.exists(c).await
    }
    async fn create_collection(&self, c: &str, s: &CollectionSpec) -> StoreResult<()> {
        self.0.create_collection(c, s).await
    }
    async fn index_document(&self, _: &str, _: &str, _: &Value) -> StoreResult<()> {
        Err(StoreError::Status {
            status: 403,
            body: "cluster_block_exception".into(),
        })
    }
    async fn flush(&self, c: &str) -> StoreResult<()> {
        self.0.flush(c).await
    }
    async fn search(&self, c: &str, q: &SearchQuery) -> StoreResult<RawSearchResult> {
        self.0.search(c, q).await
    }
}

#[tokio::test]
async fn write_failure_stops_the_run() {
    let store = Arc::new(ReadOnlyStore(MemoryStore::new()));
    let err = pipeline::run(&config(10), store, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::Write { ref key, .. } if key == "1"));
    assert!(err.is_fatal());
}
