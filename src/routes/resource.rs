//! Router assembly for registered endpoints.
//! Endpoints sharing a route (same segments, parameter names ignored) are merged into one
//! method router. Every route is mounted with and without a trailing slash.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};

use crate::descriptor::{Action, EndpointDescriptor, EndpointHandler, ResourceDescriptor};
use crate::extractors::AuthorizationContext;
use crate::handlers::{aggregate, crud};
use crate::registry::Registry;
use crate::state::AppState;

type Params = Query<HashMap<String, String>>;

fn bind(resource: &Arc<ResourceDescriptor>, endpoint: &Arc<EndpointDescriptor>) -> MethodRouter<AppState> {
    let r = resource.clone();
    match endpoint.action {
        Action::Delete => delete(
            move |State(state): State<AppState>, ctx: AuthorizationContext, Path(id): Path<String>| {
                crud::delete_item(r.clone(), state, ctx, id)
            },
        ),
        Action::Get => get(
            move |State(state): State<AppState>, ctx: AuthorizationContext, Path(id): Path<String>| {
                crud::get_item(r.clone(), state, ctx, id)
            },
        ),
        Action::Update => put(
            move |State(state): State<AppState>,
                  ctx: AuthorizationContext,
                  Path(id): Path<String>,
                  body: Bytes| { crud::update_item(r.clone(), state, ctx, id, body) },
        ),
        Action::List => get(
            move |State(state): State<AppState>, ctx: AuthorizationContext, Query(params): Params| {
                crud::list_items(r.clone(), state, ctx, params)
            },
        ),
        Action::Create => post(move |State(state): State<AppState>, body: Bytes| {
            crud::create_item(r.clone(), state, body)
        }),
        Action::Aggregate | Action::Custom => {
            let e = endpoint.clone();
            let handler = move |State(state): State<AppState>,
                                ctx: AuthorizationContext,
                                Query(params): Params,
                                body: Bytes| {
                aggregate::run_aggregation(r.clone(), e.clone(), state, ctx, params, body)
            };
            if endpoint.method == Method::GET {
                get(handler)
            } else {
                post(handler)
            }
        }
    }
}

fn route_key(path: &str) -> String {
    path.trim_end_matches('/')
        .split('/')
        .map(|seg| if seg.starts_with(':') { ":" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Default)]
struct Mounts {
    order: Vec<String>,
    routes: HashMap<String, (String, MethodRouter<AppState>)>,
}

impl Mounts {
    fn add(&mut self, endpoint: &EndpointDescriptor, router: MethodRouter<AppState>) {
        let path = endpoint.mount_path();
        let key = route_key(&path);
        match self.routes.remove(&key) {
            Some((mounted, existing)) => {
                self.routes.insert(key, (mounted, existing.merge(router)));
            }
            None => {
                self.order.push(key.clone());
                self.routes.insert(key, (path, router));
            }
        }
    }

    fn into_router(mut self) -> Router<AppState> {
        let mut router = Router::new();
        for key in self.order {
            let Some((path, methods)) = self.routes.remove(&key) else {
                continue;
            };
            let bare = path.trim_end_matches('/').to_string();
            router = router
                .route(&format!("{}/", bare), methods.clone())
                .route(&bare, methods);
        }
        router
    }
}

/// Router for every registered endpoint: synthesized CRUD and aggregation endpoints bound
/// to their resource, then free-standing endpoints with their own handlers.
pub fn api_routes(registry: &Registry) -> Router<AppState> {
    let mut mounts = Mounts::default();
    for resource in registry.resources() {
        for endpoint in &resource.endpoints {
            let methods = match &endpoint.handler {
                EndpointHandler::Custom(methods) => methods.clone(),
                EndpointHandler::Resource => bind(resource, endpoint),
            };
            mounts.add(endpoint, methods);
        }
    }
    for endpoint in registry.endpoints() {
        match &endpoint.handler {
            EndpointHandler::Custom(methods) => mounts.add(endpoint, methods.clone()),
            EndpointHandler::Resource => {
                tracing::warn!(endpoint = %endpoint.name, "free-standing endpoint has no handler, not mounted")
            }
        }
    }
    tracing::debug!(routes = mounts.order.len(), "api routes assembled");
    mounts.into_router()
}
