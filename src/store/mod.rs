//! Storage backends.
//!
//! The pipeline only talks to [`DocumentStore`]; [`connect`] picks the
//! implementation from the URL scheme:
//!
//!   http:// https://    → Elasticsearch REST API
//!   redis:// rediss://  → Redis (JSON documents + sorted-set indexes)
//!   memory://           → in-process store, used by tests and dry runs

pub mod elastic;
pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::schema::CollectionSpec;

pub use self::elastic::ElasticStore;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

// ─── Errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("backend responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("collection '{0}' already exists")]
    AlreadyExists(String),

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("unsupported by this backend: {0}")]
    Unsupported(String),

    #[error("malformed backend payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid backend url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ─── Query shapes ────────────────────────────────────────────────

/// Exact match of one field against one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// Backend-level search: term filter, single sort key, `[offset, offset+limit)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub filter: TermFilter,
    pub sort: SortSpec,
    pub offset: usize,
    pub limit: usize,
}

/// A stored document as returned by a search, not yet decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub key: String,
    pub source: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSearchResult {
    /// Number of documents matching the filter, independent of the page.
    pub total: u64,
    pub took_ms: u64,
    pub hits: Vec<RawHit>,
}

/// What the backend reports about itself on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub backend: &'static str,
    pub version: Option<String>,
}

// ─── Backend contract ────────────────────────────────────────────

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn info(&self) -> StoreResult<BackendInfo>;

    async fn exists(&self, collection: &str) -> StoreResult<bool>;

    /// Must return [`StoreError::AlreadyExists`] when the collection is
    /// already there.
    async fn create_collection(&self, collection: &str, spec: &CollectionSpec)
        -> StoreResult<()>;

    /// Writes `body` under `key`, replacing any previous document with the
    /// same key.
    async fn index_document(
        &self,
        collection: &str,
        key: &str,
        body: &serde_json::Value,
    ) -> StoreResult<()>;

    /// Barrier after which every acknowledged write is visible to search.
    async fn flush(&self, collection: &str) -> StoreResult<()>;

    async fn search(&self, collection: &str, query: &SearchQuery)
        -> StoreResult<RawSearchResult>;
}

/// Opens the backend named by `url`.
pub async fn connect(url: &str) -> StoreResult<Arc<dyn DocumentStore>> {
    let parsed = reqwest::Url::parse(url).map_err(|e| StoreError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(Arc::new(ElasticStore::new(url)?)),
        "redis" | "rediss" => Ok(Arc::new(RedisStore::connect(url).await?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
