//! End-to-end behaviour of synthesized resource endpoints over the in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use resource_forge::{
    AggregationConfig, AggregationMethod, App, Document, DocumentStore, FieldDef,
    FieldTypeConfig as T, FindOptions, MemoryStore, ModelDef, ResourceConfig, ResourceDescriptor,
    ServiceConfig, StoreError,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn widget() -> ResourceConfig {
    ResourceConfig::new(ModelDef::record("Widget").field(FieldDef::new("Name", T::String).filter()))
}

fn router(configs: Vec<ResourceConfig>, store: Arc<dyn DocumentStore>) -> Router {
    let mut app = App::new(ServiceConfig::default());
    app.register_resources(configs).unwrap();
    app.into_router(store)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(res: Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_returns_created_item_with_generated_id() {
    let app = router(vec![widget()], Arc::new(MemoryStore::new()));

    let res = app
        .oneshot(request("POST", "/api/widget/", Some(json!({"name": "x"}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = body_json(res).await;
    assert_eq!(body["status"], true);
    assert_eq!(body["status_code"], 201);
    assert_eq!(body["result"]["name"], "x");
    assert_eq!(body["result"]["id"].as_str().map(str::len), Some(24));
}

#[tokio::test]
async fn create_get_update_roundtrip() {
    let app = router(vec![widget()], Arc::new(MemoryStore::new()));

    let created = body_json(
        app.clone()
            .oneshot(request("POST", "/api/widget", Some(json!({"name": "x"}))))
            .await
            .unwrap(),
    )
    .await;
    let id = created["result"]["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request("GET", &format!("/api/widget/{}", id), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["result"]["name"], "x");

    let res = app
        .clone()
        .oneshot(request("PUT", &format!("/api/widget/{}/", id), Some(json!({"name": "y"}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["message"], "item updated");
    assert_eq!(body["result"]["name"], "y");
    assert_eq!(body["result"]["id"], id.as_str());
}

#[tokio::test]
async fn malformed_identity_and_body_are_bad_requests() {
    let app = router(vec![widget()], Arc::new(MemoryStore::new()));

    let res = app
        .clone()
        .oneshot(request("GET", "/api/widget/not-an-id", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/widget/")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["message"], "body parse error");
}

#[tokio::test]
async fn soft_delete_hides_item_and_second_delete_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let app = router(vec![widget().soft_delete(true)], store.clone());

    let created = body_json(
        app.clone()
            .oneshot(request("POST", "/api/widget/", Some(json!({"name": "x"}))))
            .await
            .unwrap(),
    )
    .await;
    let id = created["result"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/widget/{}", id);

    let res = app.clone().oneshot(request("DELETE", &uri, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["result"]["affected"], 1);

    let res = app.clone().oneshot(request("DELETE", &uri, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(res).await["message"],
        "item already deleted or not found"
    );

    let res = app.clone().oneshot(request("GET", &uri, None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // the document is still stored, flagged as deleted
    let all = store
        .find("widget", &Document::new(), FindOptions { limit: 10, offset: 0 })
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["is_deleted"], true);
}

#[tokio::test]
async fn list_pages_and_filters() {
    let app = router(vec![widget()], Arc::new(MemoryStore::new()));
    for name in ["a", "b", "b", "c"] {
        let res = app
            .clone()
            .oneshot(request("POST", "/api/widget/", Some(json!({"name": name}))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let body = body_json(
        app.clone()
            .oneshot(request("GET", "/api/widget/?limit=2&offset=1", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["result"]["total"], 4);
    assert_eq!(body["result"]["start"], 1);
    assert_eq!(body["result"]["items"].as_array().map(Vec::len), Some(2));

    let body = body_json(
        app.oneshot(request("GET", "/api/widget?name=b", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["result"]["total"], 2);
}

#[tokio::test]
async fn float32_filters_match_stored_values() {
    let gauge = ResourceConfig::new(
        ModelDef::record("Gauge").field(FieldDef::new("Level", T::Float32).filter()),
    );
    let app = router(vec![gauge], Arc::new(MemoryStore::new()));

    let res = app
        .clone()
        .oneshot(request("POST", "/api/gauge/", Some(json!({"level": 0.1}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = body_json(
        app.oneshot(request("GET", "/api/gauge/?level=0.1", None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["result"]["total"], 1);
}

/// Delegates to a memory store and records what `find` was asked for.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    finds: Mutex<Vec<(Document, FindOptions)>>,
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.finds.lock().unwrap().push((filter.clone(), options));
        self.inner.find(collection, filter, options).await
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Value, StoreError> {
        self.inner.insert_one(collection, doc).await
    }

    async fn update_one(&self, collection: &str, filter: &Document, set: &Document) -> Result<u64, StoreError> {
        self.inner.update_one(collection, filter, set).await
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        self.inner.delete_one(collection, filter).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>, StoreError> {
        self.inner.aggregate(collection, pipeline).await
    }
}

#[tokio::test]
async fn list_passes_typed_filter_and_paging_to_the_store() {
    let store = Arc::new(RecordingStore::default());
    let config = ResourceConfig::new(
        ModelDef::record("PriceTimes")
            .field(FieldDef::new("Ticker", T::String).filter())
            .field(FieldDef::new("Price", T::Float64)),
    );
    let app = router(vec![config], store.clone());

    let res = app
        .oneshot(request("GET", "/api/price_times/?ticker=ABC&limit=5", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let finds = store.finds.lock().unwrap();
    assert_eq!(finds.len(), 1);
    let (filter, options) = &finds[0];
    assert_eq!(Value::Object(filter.clone()), json!({"ticker": "ABC"}));
    assert_eq!(*options, FindOptions { limit: 5, offset: 0 });
}

#[tokio::test]
async fn aggregation_substitutes_body_values() {
    let aggregation = AggregationConfig {
        path: "price_times/avg".into(),
        method: AggregationMethod::Post,
        response: ModelDef::record("TickerAvg").field(FieldDef::new("Avg", T::Float64)),
        request: Some(ModelDef::record("TickerQuery").field(FieldDef::new("Ticker", T::String))),
        pipeline: vec![
            json!({"$match": {"ticker": {"$param": "ticker"}}}),
            json!({"$group": {"_id": "$ticker", "avg": {"$avg": "$price"}}}),
        ],
        description: None,
    };
    let config = ResourceConfig::new(
        ModelDef::record("PriceTimes")
            .field(FieldDef::new("Ticker", T::String))
            .field(FieldDef::new("Price", T::Float64)),
    )
    .soft_delete(true)
    .aggregation(aggregation);
    let app = router(vec![config], Arc::new(MemoryStore::new()));

    for (ticker, price) in [("ABC", 10.0), ("ABC", 20.0), ("XYZ", 99.0)] {
        app.clone()
            .oneshot(request(
                "POST",
                "/api/price_times/",
                Some(json!({"ticker": ticker, "price": price})),
            ))
            .await
            .unwrap();
    }

    let res = app
        .oneshot(request("POST", "/api/price_times/avg", Some(json!({"ticker": "ABC"}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    let items = body["result"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["avg"].as_f64(), Some(15.0));
}

#[tokio::test]
async fn hooks_transform_and_observe_persisted_items() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = seen.clone();
    let descriptor = ResourceDescriptor::build(ResourceConfig::new(
        ModelDef::record("Article")
            .field(FieldDef::new("Title", T::String))
            .field(FieldDef::new("Slug", T::String)),
    ))
    .unwrap()
    .before_insert(|mut doc| {
        let slug = doc
            .get("title")
            .and_then(Value::as_str)
            .map(|t| t.to_lowercase().replace(' ', "-"))
            .ok_or_else(|| "title required".to_string())?;
        doc.insert("slug".into(), json!(slug));
        Ok(doc)
    })
    .after_persist(move |item| {
        observed.lock().unwrap().push(item.clone());
        Ok(())
    });

    let mut app = App::new(ServiceConfig::default());
    app.register_descriptor(descriptor).unwrap();
    let router = app.into_router(Arc::new(MemoryStore::new()));

    let res = router
        .clone()
        .oneshot(request("POST", "/api/article/", Some(json!({"title": "Hello World"}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(body_json(res).await["result"]["slug"], "hello-world");
    assert_eq!(seen.lock().unwrap().len(), 1);

    let res = router
        .oneshot(request("POST", "/api/article/", Some(json!({}))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(seen.lock().unwrap().len(), 1);
}
