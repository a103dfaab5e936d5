//! Synthetic metric feeder for searchable document stores.
//!
//! Provisions a collection, writes normally distributed samples attributed to
//! a fixed roster of producers, and reads them back with a term-filtered,
//! date-sorted, paginated search.

use std::sync::Arc;

pub mod config;
pub mod dashboard;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod server;
pub mod store;

pub use error::{FeedError, FeedResult};
pub use model::Sample;

/// Shared state available to every API handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Search path over the sample collection.
    pub queries: query::QueryService,

    /// Written by the ingestion loop, read by the metrics endpoints.
    pub metrics: Arc<metrics::IngestMetrics>,

    /// Id counter of the running ingestion loop (read only here).
    pub counter: Arc<ingest::SampleCounter>,
}
