//! Handlers for synthesized CRUD endpoints. Each is bound to its resource when the router
//! is assembled.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};

use crate::config::{ServiceConfig, MAX_RESPONSE_LIMIT};
use crate::descriptor::ResourceDescriptor;
use crate::error::AppError;
use crate::extractors::AuthorizationContext;
use crate::query::{build_filter, coerce, QueryFilter};
use crate::response::{success_created, success_list, success_ok};
use crate::service::CrudService;
use crate::state::AppState;
use crate::store::FindOptions;

pub(crate) fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::bad_request("body parse error", e))
}

/// Filter selecting the item named by the path parameter: soft-delete constraint, then the
/// primary field, then the authorization filter.
fn identity_filter(
    resource: &ResourceDescriptor,
    raw: &str,
    ctx: &AuthorizationContext,
) -> Result<QueryFilter, AppError> {
    let primary = resource
        .primary()
        .ok_or_else(|| AppError::internal("server error", "resource has no primary field"))?;
    let value = coerce(raw, &primary.field_type).ok_or_else(|| {
        AppError::bad_request(
            "invalid identity",
            format!("'{}' is not a valid {}", raw, primary.name),
        )
    })?;
    let base = QueryFilter::new().with(primary.storage_key.clone(), value);
    let mut filter = build_filter(&HashMap::new(), resource, base);
    filter.merge_supplemental(ctx.supplemental_filter());
    Ok(filter)
}

/// Page size for a list request. The resource's limit (or the service default) applies
/// unless the request asks for another and the limit is not locked.
fn page_limit(resource: &ResourceDescriptor, config: &ServiceConfig, requested: Option<&String>) -> u64 {
    let base = resource
        .flags
        .response_limit
        .unwrap_or(config.default_response_limit);
    let limit = if resource.flags.limit_locked {
        base
    } else {
        requested
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(base)
    };
    u64::from(limit.min(MAX_RESPONSE_LIMIT))
}

pub async fn get_item(
    resource: Arc<ResourceDescriptor>,
    state: AppState,
    ctx: AuthorizationContext,
    id: String,
) -> Result<Response, AppError> {
    let filter = identity_filter(&resource, &id, &ctx)?;
    let item = CrudService::read(state.store.as_ref(), &resource, &filter)
        .await?
        .ok_or_else(|| AppError::NotFound("item not found".into()))?;
    Ok(success_ok("", item).into_response())
}

pub async fn list_items(
    resource: Arc<ResourceDescriptor>,
    state: AppState,
    ctx: AuthorizationContext,
    params: HashMap<String, String>,
) -> Result<Response, AppError> {
    let limit = page_limit(&resource, &state.config, params.get("limit"));
    let offset = params
        .get("offset")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let mut filter = build_filter(&params, &resource, QueryFilter::new());
    filter.merge_supplemental(ctx.supplemental_filter());
    let page = CrudService::list(
        state.store.as_ref(),
        &resource,
        &filter,
        FindOptions { limit, offset },
    )
    .await?;
    Ok(success_list(page.items, page.total, offset).into_response())
}

pub async fn create_item(
    resource: Arc<ResourceDescriptor>,
    state: AppState,
    body: Bytes,
) -> Result<Response, AppError> {
    let body = parse_body(&body)?;
    let item = CrudService::create(state.store.as_ref(), &resource, &body).await?;
    tracing::info!(resource = %resource.name, "item created");
    Ok(success_created("item created", item).into_response())
}

pub async fn update_item(
    resource: Arc<ResourceDescriptor>,
    state: AppState,
    ctx: AuthorizationContext,
    id: String,
    body: Bytes,
) -> Result<Response, AppError> {
    let filter = identity_filter(&resource, &id, &ctx)?;
    let body = parse_body(&body)?;
    let item = CrudService::update(state.store.as_ref(), &resource, &filter, &body)
        .await?
        .ok_or_else(|| AppError::NotFound("item not found".into()))?;
    Ok(success_ok("item updated", item).into_response())
}

pub async fn delete_item(
    resource: Arc<ResourceDescriptor>,
    state: AppState,
    ctx: AuthorizationContext,
    id: String,
) -> Result<Response, AppError> {
    let filter = identity_filter(&resource, &id, &ctx)?;
    let affected = CrudService::delete(state.store.as_ref(), &resource, &filter).await?;
    if affected == 0 {
        return Err(AppError::NotFound("item already deleted or not found".into()));
    }
    Ok(success_ok("item deleted", json!({ "affected": affected })).into_response())
}
