//! `ElasticStore` against a local axum router that speaks just enough of the
//! Elasticsearch REST API and records every request it sees.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use search_feeder::config::FeederConfig;
use search_feeder::pipeline;
use search_feeder::query::{QueryService, SearchRequest};
use search_feeder::schema::{ensure_collection, CollectionSpec, Provisioned};
use search_feeder::store::{DocumentStore, ElasticStore, StoreError};

// ─── Fake cluster ────────────────────────────────────────────────

#[derive(Default)]
struct FakeCluster {
    /// HEAD on the index answers 200 instead of 404.
    index_exists: bool,
    /// PUT on the index answers 400 resource_already_exists_exception.
    lose_create_race: bool,
    requests: Mutex<Vec<String>>,
    bodies: Mutex<BTreeMap<String, Value>>,
    docs: Mutex<BTreeMap<String, Value>>,
}

impl FakeCluster {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    fn body(&self, request: &str) -> Value {
        self.bodies.lock().get(request).cloned().unwrap_or(Value::Null)
    }

    /// Term filter, single-field ascending/descending sort, from/size.
    fn search(&self, body: &Value) -> Value {
        let (field, value) = body["query"]["term"]
            .as_object()
            .and_then(|t| t.iter().next())
            .map(|(f, v)| (f.clone(), v.clone()))
            .unwrap_or_default();
        let (sort_field, order) = body["sort"][0]
            .as_object()
            .and_then(|s| s.iter().next())
            .map(|(f, o)| (f.clone(), o["order"].as_str().unwrap_or("asc").to_string()))
            .unwrap_or_default();

        let mut hits: Vec<(String, Value)> = self
            .docs
            .lock()
            .iter()
            .filter(|(_, doc)| doc[&field] == value)
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect();
        hits.sort_by(|a, b| {
            let ord = a.1[&sort_field]
                .as_str()
                .cmp(&b.1[&sort_field].as_str());
            if order == "desc" {
                ord.reverse()
            } else {
                ord
            }
        });

        let from = body["from"].as_u64().unwrap_or(0) as usize;
        let size = body["size"].as_u64().unwrap_or(10) as usize;
        let page: Vec<Value> = hits
            .iter()
            .skip(from)
            .take(size)
            .map(|(id, doc)| json!({ "_id": id, "_source": doc }))
            .collect();

        json!({
            "took": 3,
            "hits": { "total": { "value": hits.len(), "relation": "eq" }, "hits": page }
        })
    }
}

async fn handle(
    State(cluster): State<Arc<FakeCluster>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().trim_start_matches('/').to_string();
    let request = format!("{method} {path}");
    cluster.requests.lock().push(request.clone());
    let json_body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    if !json_body.is_null() {
        cluster.bodies.lock().insert(request, json_body.clone());
    }

    let segments: Vec<&str> = path.split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", [""]) => Json(json!({ "version": { "number": "7.17.0" } })).into_response(),
        ("HEAD", ["random"]) if cluster.index_exists => StatusCode::OK.into_response(),
        ("HEAD", ["random"]) => StatusCode::NOT_FOUND.into_response(),
        ("PUT", ["random"]) if cluster.lose_create_race => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": { "type": "resource_already_exists_exception" },
                "status": 400
            })),
        )
            .into_response(),
        ("PUT", ["random"]) => Json(json!({ "acknowledged": true })).into_response(),
        ("PUT", ["random", "_doc", key]) => {
            cluster.docs.lock().insert(key.to_string(), json_body);
            (StatusCode::CREATED, Json(json!({ "result": "created" }))).into_response()
        }
        ("POST", ["random", "_refresh" | "_flush"]) => Json(json!({})).into_response(),
        ("POST", ["random", "_search"]) => Json(cluster.search(&json_body)).into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "unexpected request" })),
        )
            .into_response(),
    }
}

async fn spawn_cluster(cluster: FakeCluster) -> (Arc<FakeCluster>, SocketAddr) {
    let cluster = Arc::new(cluster);
    let app = Router::new().fallback(handle).with_state(cluster.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (cluster, addr)
}

fn store(addr: SocketAddr) -> ElasticStore {
    ElasticStore::new(&format!("http://{addr}/")).unwrap()
}

fn sample(id: u64, creator: &str, created: &str) -> Value {
    json!({ "id": id, "created": created, "creator": creator, "randomNumber": 0.5 })
}

// ─── Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn reports_version() {
    let (_, addr) = spawn_cluster(FakeCluster::default()).await;
    let info = store(addr).info().await.unwrap();
    assert_eq!(info.backend, "elasticsearch");
    assert_eq!(info.version.as_deref(), Some("7.17.0"));
}

#[tokio::test]
async fn missing_index_is_created_with_mapping() {
    let (cluster, addr) = spawn_cluster(FakeCluster::default()).await;
    let store = store(addr);

    assert!(!store.exists("random").await.unwrap());
    let outcome = ensure_collection(&store, "random", &CollectionSpec::samples())
        .await
        .unwrap();

    assert_eq!(outcome, Provisioned::Created);
    assert_eq!(
        cluster.requests(),
        ["HEAD random", "HEAD random", "PUT random"]
    );
    let body = cluster.body("PUT random");
    assert_eq!(body["settings"]["number_of_shards"], 1);
    assert_eq!(body["settings"]["number_of_replicas"], 0);
    assert_eq!(body["mappings"]["properties"]["created"]["type"], "date");
    assert_eq!(body["mappings"]["properties"]["creator"]["type"], "keyword");
}

#[tokio::test]
async fn existing_index_is_left_alone() {
    let (cluster, addr) = spawn_cluster(FakeCluster {
        index_exists: true,
        ..FakeCluster::default()
    })
    .await;

    let outcome = ensure_collection(&store(addr), "random", &CollectionSpec::samples())
        .await
        .unwrap();

    assert_eq!(outcome, Provisioned::AlreadyExists);
    assert_eq!(cluster.requests(), ["HEAD random"]);
}

#[tokio::test]
async fn lost_create_race_counts_as_already_exists() {
    let (cluster, addr) = spawn_cluster(FakeCluster {
        lose_create_race: true,
        ..FakeCluster::default()
    })
    .await;
    let store = store(addr);

    let err = store
        .create_collection("random", &CollectionSpec::samples())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    let outcome = ensure_collection(&store, "random", &CollectionSpec::samples())
        .await
        .unwrap();
    assert_eq!(outcome, Provisioned::AlreadyExists);
    assert_eq!(
        cluster.requests(),
        ["PUT random", "HEAD random", "PUT random"]
    );
}

#[tokio::test]
async fn documents_are_put_by_key_and_flush_refreshes_first() {
    let (cluster, addr) = spawn_cluster(FakeCluster::default()).await;
    let store = store(addr);
    let doc = sample(1, "Pavel", "2024-01-01T00:00:00Z");

    store.index_document("random", "1", &doc).await.unwrap();
    store.flush("random").await.unwrap();

    assert_eq!(
        cluster.requests(),
        ["PUT random/_doc/1", "POST random/_refresh", "POST random/_flush"]
    );
    assert_eq!(cluster.body("PUT random/_doc/1"), doc);
}

#[tokio::test]
async fn error_status_carries_the_body() {
    let (_, addr) = spawn_cluster(FakeCluster::default()).await;
    let err = store(addr)
        .index_document("closed", "1", &json!({}))
        .await
        .unwrap_err();

    match err {
        StoreError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("unexpected request"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn search_sends_term_sort_and_window() {
    let (cluster, addr) = spawn_cluster(FakeCluster::default()).await;
    let store = Arc::new(store(addr));
    for (key, creator, created) in [
        ("1", "Pavel", "2024-01-01T00:00:03Z"),
        ("2", "John", "2024-01-01T00:00:01Z"),
        ("3", "Pavel", "2024-01-01T00:00:01Z"),
    ] {
        let id = key.parse().unwrap();
        store
            .index_document("random", key, &sample(id, creator, created))
            .await
            .unwrap();
    }

    let page = QueryService::new(store, "random")
        .search(&SearchRequest::by_creator("Pavel"))
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(page.took_ms, 3);
    assert_eq!(
        page.samples.iter().map(|s| s.id).collect::<Vec<_>>(),
        [3, 1]
    );
    assert_eq!(
        cluster.body("POST random/_search"),
        json!({
            "query": { "term": { "creator": "Pavel" } },
            "sort": [ { "created": { "order": "asc" } } ],
            "from": 0,
            "size": 15,
            "track_total_hits": true,
        })
    );
}

#[tokio::test]
async fn full_run_against_the_rest_api() {
    let (cluster, addr) = spawn_cluster(FakeCluster::default()).await;
    let mut config = FeederConfig::with_store_url(format!("http://{addr}"));
    config.roster_names = vec!["Pavel".into()];
    config.burst_count = 3;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = pipeline::run(&config, Arc::new(store(addr)), cancel)
        .await
        .unwrap();

    assert_eq!(summary.provisioned, Provisioned::Created);
    assert_eq!(summary.demo.map(|page| page.total), Some(3));
    assert_eq!(
        cluster.requests(),
        [
            "GET ",
            "HEAD random",
            "PUT random",
            "PUT random/_doc/1",
            "PUT random/_doc/2",
            "PUT random/_doc/3",
            "POST random/_refresh",
            "POST random/_flush",
            "POST random/_search",
        ]
    );
}
