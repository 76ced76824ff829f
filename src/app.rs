//! Service root: owns the registry during registration, then assembles the router.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    handler::Handler,
    http::Method,
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{validate, Model, ModelDef, ResourceConfig, ServiceConfig};
use crate::descriptor::{build_shape, Action, EndpointDescriptor, EndpointHandler, ResourceDescriptor};
use crate::docs::generate;
use crate::error::ConfigError;
use crate::middleware::{
    authorization_gate, panic_response, redact_internal_errors, request_id, Authorizer, MakeReqId,
};
use crate::registry::Registry;
use crate::routes::{api_routes, common_routes, docs_routes};
use crate::state::AppState;
use crate::store::DocumentStore;

pub struct App {
    config: ServiceConfig,
    registry: Registry,
    authorizer: Option<Arc<dyn Authorizer>>,
    documentation: Value,
}

impl App {
    pub fn new(config: ServiceConfig) -> Self {
        let mut app = App {
            config,
            registry: Registry::new(),
            authorizer: None,
            documentation: Value::Null,
        };
        app.refresh_documentation();
        app
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Install the authorization callback consulted for non-public endpoints.
    pub fn set_authorizer(&mut self, authorizer: impl Authorizer + 'static) -> &mut Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    pub fn register_resource(&mut self, config: ResourceConfig) -> Result<Arc<ResourceDescriptor>, ConfigError> {
        self.register_descriptor(ResourceDescriptor::build(config)?)
    }

    pub fn register_model<M: Model>(&mut self) -> Result<Arc<ResourceDescriptor>, ConfigError> {
        self.register_resource(ResourceConfig::for_model::<M>())
    }

    /// Register a descriptor built by the caller, e.g. one carrying persistence hooks.
    pub fn register_descriptor(
        &mut self,
        descriptor: ResourceDescriptor,
    ) -> Result<Arc<ResourceDescriptor>, ConfigError> {
        let resource = self.registry.register_resource(descriptor)?;
        self.refresh_documentation();
        Ok(resource)
    }

    /// Validate a set of definitions as a whole, then register each.
    pub fn register_resources(&mut self, configs: Vec<ResourceConfig>) -> Result<(), ConfigError> {
        validate(&configs)?;
        for config in configs {
            self.register_resource(config)?;
        }
        Ok(())
    }

    /// Register a free-standing GET endpoint under the API root. `query` and `response`
    /// describe the endpoint for documentation only.
    pub fn register_get_endpoint<H, T>(
        &mut self,
        path: &str,
        public: bool,
        query: Option<&ModelDef>,
        response: Option<&ModelDef>,
        handler: H,
    ) -> Result<&mut EndpointDescriptor, ConfigError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let mut endpoint = EndpointDescriptor::custom(Method::GET, path, Action::Custom, public);
        endpoint.query_shape = query.map(build_shape).transpose()?.map(Arc::new);
        endpoint.response_shape = response.map(build_shape).transpose()?.map(Arc::new);
        endpoint.handler = EndpointHandler::Custom(get(handler));
        self.registry.register_endpoint(endpoint)
    }

    /// Register a free-standing POST endpoint under the API root.
    pub fn register_post_endpoint<H, T>(
        &mut self,
        path: &str,
        public: bool,
        request: Option<&ModelDef>,
        response: Option<&ModelDef>,
        handler: H,
    ) -> Result<&mut EndpointDescriptor, ConfigError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let mut endpoint = EndpointDescriptor::custom(Method::POST, path, Action::Custom, public);
        endpoint.request_shape = request.map(build_shape).transpose()?.map(Arc::new);
        endpoint.response_shape = response.map(build_shape).transpose()?.map(Arc::new);
        endpoint.handler = EndpointHandler::Custom(post(handler));
        self.registry.register_endpoint(endpoint)
    }

    fn refresh_documentation(&mut self) {
        let document = generate(&self.registry, &self.config.api);
        self.documentation = serde_json::to_value(document).unwrap_or_else(|e| {
            tracing::error!(error = %e, "documentation could not be serialized");
            Value::Null
        });
    }

    /// The generated API document as of the last registration.
    pub fn documentation(&self) -> &Value {
        &self.documentation
    }

    /// Collection names of every registered resource, for store bootstrap.
    pub fn collections(&self) -> Vec<String> {
        self.registry
            .resources()
            .iter()
            .map(|r| r.collection.clone())
            .collect()
    }

    /// Freeze the registry and build the router with the full middleware stack.
    pub fn into_router(mut self, store: Arc<dyn DocumentStore>) -> Router {
        // display names set after the last registration
        self.refresh_documentation();
        let debug = self.config.debug;
        let body_limit = self.config.body_limit_bytes;
        let timeout = self.config.request_timeout;
        tracing::info!(
            resources = self.registry.resources().len(),
            endpoints = self.registry.all_endpoints().count(),
            "router built"
        );

        let state = AppState {
            store,
            registry: Arc::new(self.registry),
            documentation: Arc::new(self.documentation),
            config: Arc::new(self.config),
            authorizer: self.authorizer,
        };

        let mut router = Router::new()
            .merge(common_routes())
            .merge(docs_routes())
            .merge(api_routes(&state.registry));

        // Layers run outermost (added last) first.

        // 8) Authorization gate, closest to the handlers
        router = router.layer(from_fn_with_state(state.clone(), authorization_gate));

        // 7) Panic recovery boundary
        router = router.layer(CatchPanicLayer::custom(panic_response));

        // 6) Internal error redaction (outer to the panic boundary so panics are redacted too)
        router = router.layer(from_fn(move |req: Request, next: Next| {
            redact_internal_errors(debug, req, next)
        }));

        // 5) Body limit
        router = router.layer(RequestBodyLimitLayer::new(body_limit));
        router = router.layer(DefaultBodyLimit::max(body_limit));

        // 4) Timeout; dropping the handler future cancels the pending store call
        router = router.layer(TimeoutLayer::new(timeout));

        // 3) Request id into extensions (inner to Trace so the span exists)
        router = router.layer(from_fn(request_id::push_req_id_to_extensions));

        // 2) Trace with the request id on the span
        router = router.layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            let rid = req
                .headers()
                .get(request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("n/a");
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri().path(),
                request_id = %rid,
            )
        }));

        // 1) Request id: set when missing, then echo on the response
        router = router.layer(PropagateRequestIdLayer::new(request_id::header()));
        router = router.layer(SetRequestIdLayer::new(request_id::header(), MakeReqId));

        router.with_state(state)
    }

    /// Bind the configured listen address and serve until the process stops.
    pub async fn serve(self, store: Arc<dyn DocumentStore>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.into_router(store)).await
    }
}
