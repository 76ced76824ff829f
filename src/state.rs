//! Shared application state for all routes. Built once when the router is assembled and
//! read-only afterwards.

use std::sync::Arc;

use serde_json::Value;

use crate::config::ServiceConfig;
use crate::middleware::Authorizer;
use crate::registry::Registry;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<Registry>,
    /// Generated API document served at `/doc.json`.
    pub documentation: Arc<Value>,
    pub config: Arc<ServiceConfig>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
}
