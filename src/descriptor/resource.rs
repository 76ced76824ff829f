//! Resource descriptors: one per registered model.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use super::endpoint::{synthesize, Action, EndpointDescriptor};
use super::field::{build_resource_shape, build_shape, FieldDescriptor, ModelShape, ID_WIRE_KEY};
use crate::case::to_snake_case;
use crate::config::{AggregationConfig, AggregationMethod, ResourceConfig, ResourceFlags};
use crate::error::ConfigError;
use crate::query::pipeline::not_deleted_stage;
use crate::store::Document;

/// Transform applied to the generic document before it is persisted. An `Err` aborts the
/// request with a 500 carrying the message.
pub type DocumentHook = Arc<dyn Fn(Document) -> Result<Document, String> + Send + Sync>;

/// Observer called with the persisted item (wire form) after create or update.
pub type PersistObserver = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    pub before_insert: Option<DocumentHook>,
    pub before_update: Option<DocumentHook>,
    pub after_persist: Option<PersistObserver>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_insert", &self.before_insert.is_some())
            .field("before_update", &self.before_update.is_some())
            .field("after_persist", &self.after_persist.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    /// Model type name, e.g. `PriceTimes`.
    pub name: String,
    /// Path segment under the API root, e.g. `price_times`.
    pub path: String,
    pub collection: String,
    pub shape: Arc<ModelShape>,
    pub query_shape: Option<Arc<ModelShape>>,
    pub flags: ResourceFlags,
    pub endpoints: Vec<Arc<EndpointDescriptor>>,
    pub hooks: Hooks,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ResourceDescriptor {
    /// Normalize the model, synthesize the CRUD endpoints and append declared aggregations.
    pub fn build(config: ResourceConfig) -> Result<Self, ConfigError> {
        let shape = build_resource_shape(&config.model, config.flags.soft_delete)?;
        let query_shape = config
            .query_params
            .as_ref()
            .map(build_shape)
            .transpose()?
            .map(Arc::new);
        let path = to_snake_case(&config.model.name);
        let mut resource = ResourceDescriptor {
            name: config.model.name.clone(),
            collection: config.collection.clone().unwrap_or_else(|| path.clone()),
            path,
            shape: Arc::new(shape),
            query_shape,
            flags: config.flags.clone(),
            endpoints: Vec::new(),
            hooks: Hooks::default(),
            title: config.title.clone(),
            description: config.description.clone(),
        };
        resource.endpoints = synthesize(&resource).into_iter().map(Arc::new).collect();
        for aggregation in &config.aggregations {
            resource.add_aggregation(aggregation)?;
        }
        tracing::debug!(
            resource = %resource.name,
            fields = resource.shape.fields.len(),
            endpoints = resource.endpoints.len(),
            "resource descriptor built"
        );
        Ok(resource)
    }

    pub fn primary(&self) -> Option<&FieldDescriptor> {
        self.shape.primary()
    }

    /// Path parameter naming the primary field; `id` by default.
    pub fn path_param(&self) -> &str {
        self.primary()
            .map(|f| f.wire_key.as_deref().unwrap_or(&f.storage_key))
            .unwrap_or(ID_WIRE_KEY)
    }

    /// Filterable fields from the model, then from the query model, first wire key wins.
    pub fn filterable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        let mut seen = HashSet::new();
        self.shape
            .fields
            .iter()
            .chain(self.query_shape.iter().flat_map(|q| q.fields.iter()))
            .filter(|f| f.filter_key().is_some())
            .filter(move |f| seen.insert(f.wire_key.clone()))
    }

    pub fn endpoint(&self, action: Action) -> Option<&Arc<EndpointDescriptor>> {
        self.endpoints.iter().find(|e| e.action == action)
    }

    /// Append an aggregation endpoint. When soft delete is on, a stage excluding deleted
    /// documents is placed first in the pipeline.
    pub fn add_aggregation_endpoint(
        &mut self,
        path: &str,
        method: Method,
        response: ModelShape,
        request: Option<ModelShape>,
        pipeline: Vec<Value>,
    ) -> &mut EndpointDescriptor {
        let mut endpoint = EndpointDescriptor::custom(method.clone(), path, Action::Aggregate, self.flags.public);
        let request = request.map(Arc::new);
        if method == Method::GET {
            endpoint.query_shape = request;
        } else {
            endpoint.request_shape = request;
        }
        endpoint.response_shape = Some(Arc::new(response));
        endpoint.resource = Some(self.name.clone());
        endpoint.tags = vec![self.name.clone()];
        endpoint.pipeline = if self.flags.soft_delete {
            std::iter::once(not_deleted_stage()).chain(pipeline).collect()
        } else {
            pipeline
        };
        self.endpoints.push(Arc::new(endpoint));
        let last = self.endpoints.len() - 1;
        Arc::make_mut(&mut self.endpoints[last])
    }

    fn add_aggregation(&mut self, config: &AggregationConfig) -> Result<(), ConfigError> {
        let response = build_shape(&config.response)?;
        let request = config.request.as_ref().map(build_shape).transpose()?;
        let method = match config.method {
            AggregationMethod::Get => Method::GET,
            AggregationMethod::Post => Method::POST,
        };
        let endpoint =
            self.add_aggregation_endpoint(&config.path, method, response, request, config.pipeline.clone());
        if let Some(description) = &config.description {
            endpoint.set_description(description.clone());
        }
        Ok(())
    }

    pub fn before_insert<F>(mut self, hook: F) -> Self
    where
        F: Fn(Document) -> Result<Document, String> + Send + Sync + 'static,
    {
        self.hooks.before_insert = Some(Arc::new(hook));
        self
    }

    pub fn before_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(Document) -> Result<Document, String> + Send + Sync + 'static,
    {
        self.hooks.before_update = Some(Arc::new(hook));
        self
    }

    pub fn after_persist<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hooks.after_persist = Some(Arc::new(hook));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDef, FieldTypeConfig as T, ModelDef};
    use crate::descriptor::DELETED_KEY;
    use serde_json::json;

    fn config() -> ResourceConfig {
        ResourceConfig::new(
            ModelDef::record("PriceTimes")
                .field(FieldDef::new("Ticker", T::String).filter())
                .field(FieldDef::new("Price", T::Float64)),
        )
    }

    #[test]
    fn names_and_collection_default_to_snake_case() {
        let r = ResourceDescriptor::build(config()).unwrap();
        assert_eq!(r.path, "price_times");
        assert_eq!(r.collection, "price_times");
        let r = ResourceDescriptor::build(config().collection("prices")).unwrap();
        assert_eq!(r.collection, "prices");
    }

    #[test]
    fn aggregation_pipeline_gets_not_deleted_stage_first() {
        let agg = AggregationConfig {
            path: "price_times/avg".into(),
            method: AggregationMethod::Get,
            response: ModelDef::record("AvgPrice").field(FieldDef::new("Avg", T::Float64)),
            request: None,
            pipeline: vec![json!({"$group": {"_id": null, "avg": {"$avg": "$price"}}})],
            description: Some("average price".into()),
        };
        let r = ResourceDescriptor::build(config().soft_delete(true).aggregation(agg)).unwrap();
        let e = r.endpoint(Action::Aggregate).unwrap();
        assert_eq!(e.pipeline.len(), 2);
        assert_eq!(e.pipeline[0], json!({"$match": {DELETED_KEY: false}}));
        assert_eq!(e.doc_path, "/api/price_times/avg");
        assert_eq!(e.description.as_deref(), Some("average price"));
        assert_eq!(r.endpoints.last().map(|e| e.action), Some(Action::Aggregate));
    }

    #[test]
    fn public_flag_propagates_to_every_endpoint() {
        let r = ResourceDescriptor::build(config().public(true)).unwrap();
        assert!(r.endpoints.iter().all(|e| e.public));
    }

    #[test]
    fn duplicate_filter_wire_keys_in_query_model_are_ignored() {
        let query = ModelDef::record("Q")
            .field(FieldDef::new("Ticker", T::String).filter_as("other"))
            .field(FieldDef::new("Exchange", T::String).filter());
        let r = ResourceDescriptor::build(config().query_params(query)).unwrap();
        let keys: Vec<_> = r.filterable_fields().filter_map(|f| f.filter_key()).collect();
        assert_eq!(keys, vec!["ticker", "exchange"]);
    }
}
