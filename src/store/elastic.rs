use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    BackendInfo, DocumentStore, RawHit, RawSearchResult, SearchQuery, StoreError, StoreResult,
};
use crate::schema::CollectionSpec;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Elasticsearch (7.x and later) over its REST API.
///
/// `reqwest::Client` is cheaply cloneable and pools connections, so one
/// instance serves the whole process.
pub struct ElasticStore {
    client: Client,
    base_url: String,
}

impl ElasticStore {
    pub fn new(base_url: &str) -> StoreResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

/// Turns any non-2xx answer into [`StoreError::Status`] carrying the body.
async fn expect_success(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

// ─── Request / response shapes ───────────────────────────────────

pub(crate) fn search_body(query: &SearchQuery) -> Value {
    json!({
        "query": {
            "term": { query.filter.field.as_str(): query.filter.value }
        },
        "sort": [
            { query.sort.field.as_str(): { "order": query.sort.order.as_str() } }
        ],
        "from": query.offset,
        "size": query.limit,
        "track_total_hits": true,
    })
}

/// Accepts both `"total": 12` (6.x) and `"total": {"value": 12, ...}` (7.x+).
pub(crate) fn parse_search_response(body: &Value) -> StoreResult<RawSearchResult> {
    let hits = body
        .get("hits")
        .ok_or_else(|| StoreError::Payload("search response without 'hits'".into()))?;

    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(obj @ Value::Object(_)) => obj.get("value").and_then(Value::as_u64),
        _ => None,
    }
    .ok_or_else(|| StoreError::Payload("search response without a hit total".into()))?;

    let raw_hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let hits = raw_hits
        .iter()
        .map(|hit| {
            let key = hit
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::Payload("hit without '_id'".into()))?;
            Ok(RawHit {
                key: key.to_string(),
                source: hit.get("_source").cloned().unwrap_or(Value::Null),
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(RawSearchResult {
        total,
        took_ms: body.get("took").and_then(Value::as_u64).unwrap_or(0),
        hits,
    })
}

fn is_already_exists(body: &str) -> bool {
    body.contains("resource_already_exists_exception")
        || body.contains("index_already_exists_exception")
}

// ─── DocumentStore impl ──────────────────────────────────────────

#[async_trait]
impl DocumentStore for ElasticStore {
    async fn info(&self) -> StoreResult<BackendInfo> {
        let resp = expect_success(self.client.get(self.url("")).send().await?).await?;
        let body: Value = resp.json().await?;
        Ok(BackendInfo {
            backend: "elasticsearch",
            version: body
                .pointer("/version/number")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn exists(&self, collection: &str) -> StoreResult<bool> {
        let resp = self.client.head(self.url(collection)).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => expect_success(resp).await.map(|_| true),
        }
    }

    async fn create_collection(
        &self,
        collection: &str,
        spec: &CollectionSpec,
    ) -> StoreResult<()> {
        let resp = self
            .client
            .put(self.url(collection))
            .json(&spec.to_index_body())
            .send()
            .await?;

        match expect_success(resp).await {
            Ok(_) => Ok(()),
            Err(StoreError::Status { status: 400, body }) if is_already_exists(&body) => {
                Err(StoreError::AlreadyExists(collection.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn index_document(
        &self,
        collection: &str,
        key: &str,
        body: &Value,
    ) -> StoreResult<()> {
        let resp = self
            .client
            .put(self.url(&format!("{collection}/_doc/{key}")))
            .json(body)
            .send()
            .await?;
        expect_success(resp).await?;
        Ok(())
    }

    async fn flush(&self, collection: &str) -> StoreResult<()> {
        // refresh makes acknowledged writes searchable, flush commits them
        for op in ["_refresh", "_flush"] {
            let resp = self
                .client
                .post(self.url(&format!("{collection}/{op}")))
                .send()
                .await?;
            expect_success(resp).await?;
        }
        Ok(())
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> StoreResult<RawSearchResult> {
        let body = search_body(query);
        debug!(collection, request = %body, "search");

        let resp = self
            .client
            .post(self.url(&format!("{collection}/_search")))
            .json(&body)
            .send()
            .await?;
        let resp = expect_success(resp).await?;
        let body: Value = resp.json().await?;
        parse_search_response(&body)
    }
}
