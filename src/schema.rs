use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{FeedError, FeedResult};
use crate::store::{DocumentStore, StoreError};

/// Field types the provisioner knows how to declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Timestamp, sortable.
    Date,
    /// Exact-match, non-tokenized string.
    Keyword,
}

/// Settings and explicit field mapping of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub shards: u32,
    pub replicas: u32,
    pub fields: BTreeMap<String, FieldType>,
}

impl CollectionSpec {
    /// Schema of the sample collection: single shard, no replicas,
    /// `created` as a date and `creator` as a keyword.
    pub fn samples() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("created".to_string(), FieldType::Date);
        fields.insert("creator".to_string(), FieldType::Keyword);
        Self {
            shards: 1,
            replicas: 0,
            fields,
        }
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn fields_of(&self, ty: FieldType) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |(_, t)| **t == ty)
            .map(|(name, _)| name.as_str())
    }

    /// Body of an Elasticsearch create-index request.
    pub fn to_index_body(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), json!({ "type": ty })))
            .collect();

        json!({
            "settings": {
                "number_of_shards": self.shards,
                "number_of_replicas": self.replicas,
            },
            "mappings": {
                "properties": properties,
            },
        })
    }
}

/// Outcome of [`ensure_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// Creates `name` with `spec` unless it already exists. Safe to call on every
/// start; an existing collection is never altered.
pub async fn ensure_collection(
    store: &dyn DocumentStore,
    name: &str,
    spec: &CollectionSpec,
) -> FeedResult<Provisioned> {
    let provisioning = |source| FeedError::Provisioning {
        collection: name.to_string(),
        source,
    };

    if store.exists(name).await.map_err(provisioning)? {
        info!(collection = name, "collection already exists");
        return Ok(Provisioned::AlreadyExists);
    }

    match store.create_collection(name, spec).await {
        Ok(()) => {
            info!(
                collection = name,
                shards = spec.shards,
                replicas = spec.replicas,
                "created collection"
            );
            Ok(Provisioned::Created)
        }
        // Someone else created it between the check and the create.
        Err(StoreError::AlreadyExists(_)) => Ok(Provisioned::AlreadyExists),
        Err(e) => Err(provisioning(e)),
    }
}
