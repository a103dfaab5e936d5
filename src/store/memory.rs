use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use super::{
    BackendInfo, DocumentStore, RawHit, RawSearchResult, SearchQuery, SortOrder, StoreError,
    StoreResult,
};
use crate::schema::{CollectionSpec, FieldType};

/// In-process document store.
///
/// With [`MemoryStore::near_real_time`] writes are buffered and only become
/// searchable after [`DocumentStore::flush`], like a search engine between
/// refreshes. [`MemoryStore::new`] makes every write visible immediately.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
    buffered: bool,
}

struct Collection {
    spec: CollectionSpec,
    visible: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn near_real_time() -> Self {
        Self {
            buffered: true,
            ..Self::default()
        }
    }

    pub fn collection_spec(&self, collection: &str) -> Option<CollectionSpec> {
        self.collections
            .lock()
            .get(collection)
            .map(|c| c.spec.clone())
    }

    /// Distinct documents stored, searchable or not.
    pub fn document_count(&self, collection: &str) -> usize {
        let guard = self.collections.lock();
        let Some(c) = guard.get(collection) else {
            return 0;
        };
        c.visible.len()
            + c.pending
                .keys()
                .filter(|k| !c.visible.contains_key(*k))
                .count()
    }

    /// Latest version of a document, searchable or not.
    pub fn get(&self, collection: &str, key: &str) -> Option<Value> {
        let guard = self.collections.lock();
        let c = guard.get(collection)?;
        c.pending.get(key).or_else(|| c.visible.get(key)).cloned()
    }
}

// ─── Ordering helpers ────────────────────────────────────────────

/// Sort key extracted from a document field according to its mapped type.
#[derive(Debug, PartialEq, PartialOrd)]
enum SortKey {
    Date(DateTime<Utc>),
    Number(f64),
    Text(String),
}

fn sort_key(value: Option<&Value>, ty: Option<FieldType>) -> Option<SortKey> {
    let value = value?;
    if ty == Some(FieldType::Date) {
        let parsed = DateTime::parse_from_rfc3339(value.as_str()?).ok()?;
        return Some(SortKey::Date(parsed.with_timezone(&Utc)));
    }
    match value {
        Value::Number(n) => n.as_f64().map(SortKey::Number),
        Value::String(s) => Some(SortKey::Text(s.clone())),
        Value::Bool(b) => Some(SortKey::Number(f64::from(u8::from(*b)))),
        _ => None,
    }
}

/// Documents missing the sort field go last in either direction.
fn compare(a: &Option<SortKey>, b: &Option<SortKey>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn term_matches(doc: &Value, field: &str, expected: &str) -> bool {
    match doc.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        _ => false,
    }
}

// ─── DocumentStore impl ──────────────────────────────────────────

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn info(&self) -> StoreResult<BackendInfo> {
        Ok(BackendInfo {
            backend: "memory",
            version: None,
        })
    }

    async fn exists(&self, collection: &str) -> StoreResult<bool> {
        Ok(self.collections.lock().contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> StoreResult<()> {
        let mut guard = self.collections.lock();
        if guard.contains_key(collection) {
            return Err(StoreError::AlreadyExists(collection.to_string()));
        }
        guard.insert(
            collection.to_string(),
            Collection {
                spec: spec.clone(),
                visible: BTreeMap::new(),
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn index_document(
        &self,
        collection: &str,
        key: &str,
        body: &Value,
    ) -> StoreResult<()> {
        let mut guard = self.collections.lock();
        let c = guard
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        let target = if self.buffered {
            &mut c.pending
        } else {
            &mut c.visible
        };
        target.insert(key.to_string(), body.clone());
        Ok(())
    }

    async fn flush(&self, collection: &str) -> StoreResult<()> {
        let mut guard = self.collections.lock();
        let c = guard
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        let pending = std::mem::take(&mut c.pending);
        c.visible.extend(pending);
        Ok(())
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> StoreResult<RawSearchResult> {
        let started = Instant::now();
        let guard = self.collections.lock();
        let c = guard
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let sort_type = c.spec.field_type(&query.sort.field);
        let mut matched: Vec<(&String, &Value, Option<SortKey>)> = c
            .visible
            .iter()
            .filter(|(_, doc)| term_matches(doc, &query.filter.field, &query.filter.value))
            .map(|(key, doc)| (key, doc, sort_key(doc.get(&query.sort.field), sort_type)))
            .collect();

        // Stable sort: ties keep key order.
        matched.sort_by(|a, b| compare(&a.2, &b.2, query.sort.order));

        let hits = matched
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(key, doc, _)| RawHit {
                key: (*key).clone(),
                source: (*doc).clone(),
            })
            .collect();

        Ok(RawSearchResult {
            total: matched.len() as u64,
            took_ms: started.elapsed().as_millis() as u64,
            hits,
        })
    }
}
