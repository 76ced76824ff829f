//! Aggregation endpoint handler: request values are substituted into the declared pipeline,
//! the authorization filter is prepended as a `$match`, and rows are rendered through the
//! response shape.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::Method,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};

use super::crud::parse_body;
use crate::descriptor::{decode_document, encode_body, EndpointDescriptor, ModelShape, ResourceDescriptor};
use crate::error::AppError;
use crate::extractors::AuthorizationContext;
use crate::query::pipeline::values_from_query;
use crate::query::substitute;
use crate::response::success_ok;
use crate::service::CrudService;
use crate::state::AppState;

/// Values from a JSON body, normalized through the request shape when one is declared.
fn values_from_body(body: &Bytes, shape: Option<&ModelShape>) -> Result<HashMap<String, Value>, AppError> {
    if body.is_empty() {
        return Ok(HashMap::new());
    }
    let parsed = parse_body(body)?;
    let normalized = match shape {
        Some(shape) => decode_document(shape, &encode_body(shape, &parsed)?)?,
        None => parsed,
    };
    match normalized {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(AppError::bad_request("body parse error", "expected a JSON object")),
    }
}

fn build_pipeline(
    endpoint: &EndpointDescriptor,
    values: &HashMap<String, Value>,
    ctx: &AuthorizationContext,
) -> Vec<Value> {
    let mut pipeline = substitute(&endpoint.pipeline, values);
    if let Some(filter) = ctx.filter.as_ref().filter(|f| !f.is_empty()) {
        pipeline.insert(0, json!({ "$match": Value::Object(filter.to_document()) }));
    }
    pipeline
}

pub async fn run_aggregation(
    resource: Arc<ResourceDescriptor>,
    endpoint: Arc<EndpointDescriptor>,
    state: AppState,
    ctx: AuthorizationContext,
    params: HashMap<String, String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let values = if endpoint.method == Method::GET {
        values_from_query(&params, endpoint.query_shape.as_deref())
    } else {
        values_from_body(&body, endpoint.request_shape.as_deref())?
    };
    let pipeline = build_pipeline(&endpoint, &values, &ctx);
    let items = CrudService::aggregate(
        state.store.as_ref(),
        &resource,
        &pipeline,
        endpoint.response_shape.as_deref(),
    )
    .await?;
    Ok(success_ok("", items).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregationConfig, AggregationMethod, FieldDef, FieldTypeConfig as T, ModelDef, ResourceConfig};
    use crate::descriptor::{Action, DELETED_KEY};
    use crate::query::QueryFilter;

    fn endpoint() -> Arc<EndpointDescriptor> {
        let agg = AggregationConfig {
            path: "price_times/by_ticker".into(),
            method: AggregationMethod::Post,
            response: ModelDef::record("TickerAvg").field(FieldDef::new("Avg", T::Float64)),
            request: Some(ModelDef::record("TickerQuery").field(FieldDef::new("Ticker", T::String))),
            pipeline: vec![json!({"$match": {"ticker": {"$param": "ticker"}}})],
            description: None,
        };
        let r = ResourceDescriptor::build(
            ResourceConfig::new(
                ModelDef::record("PriceTimes").field(FieldDef::new("Ticker", T::String)),
            )
            .soft_delete(true)
            .aggregation(agg),
        )
        .unwrap();
        r.endpoint(Action::Aggregate).unwrap().clone()
    }

    #[test]
    fn authorization_match_goes_before_soft_delete_stage() {
        let e = endpoint();
        let ctx = AuthorizationContext {
            filter: Some(QueryFilter::new().with("owner", "u1")),
            ..Default::default()
        };
        let values = HashMap::from([("ticker".to_string(), json!("ABC"))]);
        let pipeline = build_pipeline(&e, &values, &ctx);
        assert_eq!(
            pipeline,
            vec![
                json!({"$match": {"owner": "u1"}}),
                json!({"$match": {DELETED_KEY: false}}),
                json!({"$match": {"ticker": "ABC"}}),
            ]
        );
    }

    #[test]
    fn body_values_follow_the_request_shape() {
        let e = endpoint();
        let body = Bytes::from_static(br#"{"ticker": "ABC", "junk": 1}"#);
        let values = values_from_body(&body, e.request_shape.as_deref()).unwrap();
        assert_eq!(values, HashMap::from([("ticker".to_string(), json!("ABC"))]));

        let bad = Bytes::from_static(br#"{"ticker": 5}"#);
        assert!(values_from_body(&bad, e.request_shape.as_deref()).is_err());
    }
}
