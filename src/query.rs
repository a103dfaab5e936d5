use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::metrics::IngestMetrics;
use crate::model::Sample;
use crate::store::{DocumentStore, RawHit, SearchQuery, SortOrder, SortSpec, TermFilter};

/// Filtered, sorted, paginated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub filter_field: String,
    pub filter_value: String,
    pub sort_field: String,
    pub ascending: bool,
    pub offset: usize,
    pub limit: usize,
}

impl SearchRequest {
    pub const DEFAULT_LIMIT: usize = 15;

    /// `creator == creator`, oldest first, first page of 15.
    pub fn by_creator(creator: impl Into<String>) -> Self {
        Self {
            filter_field: "creator".into(),
            filter_value: creator.into(),
            sort_field: "created".into(),
            ascending: true,
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    fn to_store_query(&self) -> SearchQuery {
        SearchQuery {
            filter: TermFilter {
                field: self.filter_field.clone(),
                value: self.filter_value.clone(),
            },
            sort: SortSpec {
                field: self.sort_field.clone(),
                order: if self.ascending {
                    SortOrder::Asc
                } else {
                    SortOrder::Desc
                },
            },
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// What to do with a hit that does not decode into a [`Sample`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Fail the whole search.
    #[default]
    Strict,
    /// Drop the hit, log it and count it in [`SearchPage::skipped`].
    SkipMalformed,
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    /// Matches across all pages.
    pub total: u64,
    pub took_ms: u64,
    pub offset: usize,
    pub samples: Vec<Sample>,
    /// Hits dropped under [`DecodePolicy::SkipMalformed`].
    pub skipped: usize,
}

impl SearchPage {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decodes hit sources into samples according to `policy`.
pub fn decode_hits(hits: Vec<RawHit>, policy: DecodePolicy) -> FeedResult<(Vec<Sample>, usize)> {
    let mut samples = Vec::with_capacity(hits.len());
    let mut skipped = 0;

    for hit in hits {
        match serde_json::from_value::<Sample>(hit.source) {
            Ok(sample) => samples.push(sample),
            Err(e) if policy == DecodePolicy::SkipMalformed => {
                warn!(key = %hit.key, error = %e, "skipping malformed hit");
                skipped += 1;
            }
            Err(source) => {
                return Err(FeedError::Deserialization {
                    key: hit.key,
                    source,
                })
            }
        }
    }
    Ok((samples, skipped))
}

/// Runs [`SearchRequest`]s against one collection.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn DocumentStore>,
    collection: String,
    policy: DecodePolicy,
    metrics: Option<Arc<IngestMetrics>>,
}

impl QueryService {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            policy: DecodePolicy::default(),
            metrics: None,
        }
    }

    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<IngestMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// No match is an empty page, not an error.
    pub async fn search(&self, req: &SearchRequest) -> FeedResult<SearchPage> {
        let t0 = Instant::now();
        let result = self
            .store
            .search(&self.collection, &req.to_store_query())
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_query(t0.elapsed().as_micros() as u64, result.is_ok());
        }

        let mut raw = result.map_err(|source| FeedError::Query {
            collection: self.collection.clone(),
            source,
        })?;
        // Never hand out more than asked for, whatever the backend returned.
        raw.hits.truncate(req.limit);

        let (samples, skipped) = decode_hits(raw.hits, self.policy)?;
        debug!(
            field = %req.filter_field,
            value = %req.filter_value,
            total = raw.total,
            returned = samples.len(),
            skipped,
            "search"
        );

        Ok(SearchPage {
            total: raw.total,
            took_ms: raw.took_ms,
            offset: req.offset,
            samples,
            skipped,
        })
    }
}
