use thiserror::Error;

use crate::store::StoreError;

/// Pipeline-level failures. The driver in `pipeline` decides per variant
/// whether the process stops or the error is only reported.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Missing or invalid settings (backend URL, roster, interval, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to provision collection '{collection}': {source}")]
    Provisioning {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to write document '{key}' to '{collection}': {source}")]
    Write {
        collection: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to flush '{collection}': {source}")]
    Flush {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("search on '{collection}' failed: {source}")]
    Query {
        collection: String,
        #[source]
        source: StoreError,
    },

    /// A search hit whose source does not have the sample shape.
    #[error("hit '{key}' does not match the sample shape: {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("dashboard import failed: {0}")]
    Dashboard(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// Whether the error must stop the process. Query-side and dashboard
    /// failures leave ingestion state intact and are only reported.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration(_)
            | Self::Provisioning { .. }
            | Self::Write { .. }
            | Self::Flush { .. } => true,
            Self::Query { .. } | Self::Deserialization { .. } | Self::Dashboard(_) => false,
        }
    }

    /// Short stable name used in log fields and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Provisioning { .. } => "provisioning",
            Self::Write { .. } | Self::Flush { .. } => "write",
            Self::Query { .. } => "query",
            Self::Deserialization { .. } => "deserialization",
            Self::Dashboard(_) => "dashboard",
        }
    }
}
