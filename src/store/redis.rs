use std::collections::HashMap;
use std::time::Instant;

use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use serde_json::Value;

use super::{
    BackendInfo, DocumentStore, RawHit, RawSearchResult, SearchQuery, SortOrder, StoreError,
    StoreResult,
};
use crate::schema::{CollectionSpec, FieldType};

// ─── Key layout ──────────────────────────────────────────────────
//
//   {collection}:spec                                → JSON CollectionSpec
//   {collection}:doc:{key}                           → JSON document
//   {collection}:term:{keyword}:{value}:by:{date}    → ZSET key, score = epoch ms
//
// One sorted set per (keyword value, date field) pair answers a term filter
// sorted by date with ZCARD + ZRANGE.

fn spec_key(collection: &str) -> String {
    format!("{collection}:spec")
}

fn doc_key(collection: &str, key: &str) -> String {
    format!("{collection}:doc:{key}")
}

fn term_key(collection: &str, field: &str, value: &str, sort_field: &str) -> String {
    format!("{collection}:term:{field}:{value}:by:{sort_field}")
}

/// Index sets a document belongs to, with its score in each.
fn index_entries(collection: &str, spec: &CollectionSpec, doc: &Value) -> Vec<(String, f64)> {
    let mut entries = Vec::new();
    for keyword in spec.fields_of(FieldType::Keyword) {
        let Some(term) = doc.get(keyword).and_then(Value::as_str) else {
            continue;
        };
        for date_field in spec.fields_of(FieldType::Date) {
            if let Some(score) = date_score(doc.get(date_field)) {
                entries.push((term_key(collection, keyword, term, date_field), score));
            }
        }
    }
    entries
}

/// Largest index Redis accepts in ZRANGE (a signed 64-bit integer).
const MAX_RANGE_INDEX: usize = i64::MAX as usize;

/// Inclusive ZRANGE bounds of `[offset, offset + limit)`; `None` when empty.
fn range_bounds(offset: usize, limit: usize) -> Option<(usize, usize)> {
    if limit == 0 || offset > MAX_RANGE_INDEX {
        return None;
    }
    let stop = offset.saturating_add(limit - 1).min(MAX_RANGE_INDEX);
    Some((offset, stop))
}

fn date_score(value: Option<&Value>) -> Option<f64> {
    let parsed = DateTime::parse_from_rfc3339(value?.as_str()?).ok()?;
    Some(parsed.timestamp_millis() as f64)
}

/// Redis as a document store. Overwrites keep the sorted-set indexes
/// consistent by removing the previous version's entries in the same
/// MULTI/EXEC as the new write.
pub struct RedisStore {
    conn: ConnectionManager,
    specs: Mutex<HashMap<String, CollectionSpec>>,
}

impl RedisStore {
    /// `ConnectionManager` is cheaply cloneable and reconnects on failure;
    /// every operation clones it.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            specs: Mutex::new(HashMap::new()),
        })
    }

    async fn spec(&self, collection: &str) -> StoreResult<CollectionSpec> {
        let cached = self.specs.lock().get(collection).cloned();
        if let Some(spec) = cached {
            return Ok(spec);
        }

        let mut conn = self.conn.clone();
        let raw: Option<String> = ::redis::cmd("GET")
            .arg(spec_key(collection))
            .query_async(&mut conn)
            .await?;
        let raw = raw.ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        let spec: CollectionSpec = serde_json::from_str(&raw)?;

        self.specs
            .lock()
            .insert(collection.to_string(), spec.clone());
        Ok(spec)
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn info(&self) -> StoreResult<BackendInfo> {
        let mut conn = self.conn.clone();
        let info: String = ::redis::cmd("INFO").arg("server").query_async(&mut conn).await?;
        let version = info
            .lines()
            .find_map(|line| line.strip_prefix("redis_version:"))
            .map(|v| v.trim().to_string());
        Ok(BackendInfo {
            backend: "redis",
            version,
        })
    }

    async fn exists(&self, collection: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = ::redis::cmd("EXISTS")
            .arg(spec_key(collection))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn create_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(spec)?;
        let created: Option<String> = ::redis::cmd("SET")
            .arg(spec_key(collection))
            .arg(&json)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if created.is_none() {
            return Err(StoreError::AlreadyExists(collection.to_string()));
        }
        self.specs
            .lock()
            .insert(collection.to_string(), spec.clone());
        Ok(())
    }

    async fn index_document(
        &self,
        collection: &str,
        key: &str,
        body: &Value,
    ) -> StoreResult<()> {
        let spec = self.spec(collection).await?;
        let mut conn = self.conn.clone();
        let doc_key = doc_key(collection, key);

        let previous: Option<String> = ::redis::cmd("GET")
            .arg(&doc_key)
            .query_async(&mut conn)
            .await?;

        let mut pipe = ::redis::pipe();
        pipe.atomic();

        if let Some(previous) = previous.and_then(|p| serde_json::from_str::<Value>(&p).ok()) {
            for (set, _) in index_entries(collection, &spec, &previous) {
                pipe.cmd("ZREM").arg(set).arg(key).ignore();
            }
        }

        pipe.cmd("SET")
            .arg(&doc_key)
            .arg(serde_json::to_string(body)?)
            .ignore();
        for (set, score) in index_entries(collection, &spec, body) {
            pipe.cmd("ZADD").arg(set).arg(score).arg(key).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Redis writes are visible as soon as they are acknowledged; the barrier
    /// only confirms the collection is there.
    async fn flush(&self, collection: &str) -> StoreResult<()> {
        self.spec(collection).await.map(|_| ())
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> StoreResult<RawSearchResult> {
        let started = Instant::now();
        let spec = self.spec(collection).await?;

        if spec.field_type(&query.filter.field) != Some(FieldType::Keyword) {
            return Err(StoreError::Unsupported(format!(
                "term filter on '{}' needs a keyword field",
                query.filter.field
            )));
        }
        if spec.field_type(&query.sort.field) != Some(FieldType::Date) {
            return Err(StoreError::Unsupported(format!(
                "sorting on '{}' needs a date field",
                query.sort.field
            )));
        }

        let set = term_key(
            collection,
            &query.filter.field,
            &query.filter.value,
            &query.sort.field,
        );
        let mut conn = self.conn.clone();

        let total: u64 = ::redis::cmd("ZCARD").arg(&set).query_async(&mut conn).await?;
        let bounds = range_bounds(query.offset, query.limit)
            .filter(|(start, _)| (*start as u64) < total);
        let Some((start, stop)) = bounds else {
            return Ok(RawSearchResult {
                total,
                took_ms: started.elapsed().as_millis() as u64,
                hits: Vec::new(),
            });
        };

        let range_cmd = match query.sort.order {
            SortOrder::Asc => "ZRANGE",
            SortOrder::Desc => "ZREVRANGE",
        };
        let keys: Vec<String> = ::redis::cmd(range_cmd)
            .arg(&set)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;

        let hits = if keys.is_empty() {
            Vec::new()
        } else {
            let doc_keys: Vec<String> = keys.iter().map(|k| doc_key(collection, k)).collect();
            let docs: Vec<Option<String>> = ::redis::cmd("MGET")
                .arg(&doc_keys)
                .query_async(&mut conn)
                .await?;

            keys.into_iter()
                .zip(docs)
                // A document removed between ZRANGE and MGET is skipped.
                .filter_map(|(key, doc)| doc.map(|d| (key, d)))
                .map(|(key, doc)| {
                    Ok(RawHit {
                        key,
                        source: serde_json::from_str(&doc)?,
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?
        };

        Ok(RawSearchResult {
            total,
            took_ms: started.elapsed().as_millis() as u64,
            hits,
        })
    }
}
