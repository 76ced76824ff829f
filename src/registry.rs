//! Endpoint registry and request-to-endpoint resolution.
//!
//! Built during registration, then frozen behind an `Arc` for the lifetime of the router.

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::Method;
use regex::{Regex, RegexBuilder};

use crate::descriptor::{normalize_route_path, EndpointDescriptor, ResourceDescriptor};
use crate::error::ConfigError;

/// One compiled router pattern, named after the endpoint it serves.
#[derive(Debug)]
struct RouteEntry {
    method: Method,
    pattern: Regex,
    route_name: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    resources: Vec<Arc<ResourceDescriptor>>,
    endpoints: Vec<Arc<EndpointDescriptor>>,
    routes: Vec<RouteEntry>,
    /// `METHOD path` with parameter names erased.
    route_keys: HashSet<String>,
}

/// Request path as compared by the resolver: no leading `/`, no API root, trailing `/`.
pub fn normalize_request_path(path: &str) -> String {
    let mut p = normalize_route_path(path);
    if !p.ends_with('/') {
        p.push('/');
    }
    p
}

fn route_key(method: &Method, path: &str) -> String {
    let normalized = normalize_request_path(path);
    let erased: Vec<&str> = normalized
        .split('/')
        .map(|seg| if seg.starts_with(':') { ":" } else { seg })
        .collect();
    format!("{} {}", method, erased.join("/").to_ascii_lowercase())
}

fn compile_route(path: &str) -> Result<Regex, ConfigError> {
    let body: Vec<String> = normalize_request_path(path)
        .split('/')
        .map(|seg| {
            if seg.starts_with(':') {
                "[^/]+".to_string()
            } else {
                regex::escape(seg)
            }
        })
        .collect();
    RegexBuilder::new(&format!("^{}$", body.join("/")))
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::Validation(format!("route {}: {}", path, e)))
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_route(&mut self, endpoint: &EndpointDescriptor) -> Result<(), ConfigError> {
        let key = route_key(&endpoint.method, &endpoint.path);
        if self.route_keys.contains(&key) {
            return Err(ConfigError::DuplicatePath(key));
        }
        let pattern = compile_route(&endpoint.path)?;
        self.route_keys.insert(key);
        self.routes.push(RouteEntry {
            method: endpoint.method.clone(),
            pattern,
            route_name: endpoint.name.clone(),
        });
        Ok(())
    }

    pub fn register_resource(
        &mut self,
        resource: ResourceDescriptor,
    ) -> Result<Arc<ResourceDescriptor>, ConfigError> {
        if self.resources.iter().any(|r| r.path == resource.path) {
            return Err(ConfigError::DuplicatePath(resource.path));
        }
        let mut claimed = Vec::new();
        for endpoint in &resource.endpoints {
            let key = route_key(&endpoint.method, &endpoint.path);
            if self.route_keys.contains(&key) || claimed.contains(&key) {
                return Err(ConfigError::DuplicatePath(key));
            }
            claimed.push(key);
        }
        for endpoint in &resource.endpoints {
            self.claim_route(endpoint)?;
        }
        tracing::info!(
            resource = %resource.name,
            path = %resource.path,
            endpoints = resource.endpoints.len(),
            "resource registered"
        );
        let resource = Arc::new(resource);
        self.resources.push(resource.clone());
        Ok(resource)
    }

    /// Register a free-standing endpoint. The returned handle allows setting display
    /// metadata until the registry is frozen.
    pub fn register_endpoint(
        &mut self,
        endpoint: EndpointDescriptor,
    ) -> Result<&mut EndpointDescriptor, ConfigError> {
        self.claim_route(&endpoint)?;
        tracing::info!(method = %endpoint.method, path = %endpoint.path, "endpoint registered");
        self.endpoints.push(Arc::new(endpoint));
        let last = self.endpoints.len() - 1;
        Ok(Arc::make_mut(&mut self.endpoints[last]))
    }

    pub fn resources(&self) -> &[Arc<ResourceDescriptor>] {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Free-standing endpoints in registration order.
    pub fn endpoints(&self) -> &[Arc<EndpointDescriptor>] {
        &self.endpoints
    }

    /// Every endpoint in resolution order: resources in registration order with their
    /// endpoints in synthesis order, then free-standing endpoints.
    pub fn all_endpoints(&self) -> impl Iterator<Item = &Arc<EndpointDescriptor>> {
        self.resources
            .iter()
            .flat_map(|r| r.endpoints.iter())
            .chain(self.endpoints.iter())
    }

    /// Resolve the endpoint serving `method path`.
    ///
    /// First a case-insensitive literal match of the normalized path against each endpoint's
    /// declared path; then the compiled route table (parameters as wildcards) recovers a route
    /// name which is matched against endpoint names.
    pub fn resolve_by_route(&self, method: &Method, path: &str) -> Option<Arc<EndpointDescriptor>> {
        let wanted = normalize_request_path(path);

        if let Some(found) = self.all_endpoints().find(|e| {
            e.method == *method && normalize_request_path(&e.path).eq_ignore_ascii_case(&wanted)
        }) {
            return Some(found.clone());
        }

        let route = self
            .routes
            .iter()
            .find(|r| r.method == *method && r.pattern.is_match(&wanted))?;
        self.all_endpoints()
            .find(|e| e.name == route.route_name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldDef, FieldTypeConfig as T, ModelDef, ResourceConfig};
    use crate::descriptor::Action;

    fn resource(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::build(ResourceConfig::new(
            ModelDef::record(name).field(FieldDef::new("Name", T::String)),
        ))
        .unwrap()
    }

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register_resource(resource("Widgets")).unwrap();
        reg.register_endpoint(EndpointDescriptor::custom(
            Method::GET,
            "/api/stats/{day}",
            Action::Custom,
            true,
        ))
        .unwrap()
        .set_name("Daily stats");
        reg
    }

    #[test]
    fn resolves_single_item_path_by_pattern() {
        let reg = registry();
        let e = reg
            .resolve_by_route(&Method::GET, "widgets/507f1f77bcf86cd799439011")
            .unwrap();
        assert_eq!(e.name, "GetWidgets");
        let e = reg
            .resolve_by_route(&Method::DELETE, "/api/Widgets/507f1f77bcf86cd799439011/")
            .unwrap();
        assert_eq!(e.action, Action::Delete);
    }

    #[test]
    fn resolves_collection_path_literally_by_method() {
        let reg = registry();
        assert_eq!(reg.resolve_by_route(&Method::GET, "/api/widgets").unwrap().action, Action::List);
        assert_eq!(reg.resolve_by_route(&Method::POST, "/api/widgets/").unwrap().action, Action::Create);
    }

    #[test]
    fn free_standing_endpoints_resolve_after_resources() {
        let reg = registry();
        let e = reg.resolve_by_route(&Method::GET, "/api/stats/monday").unwrap();
        assert_eq!(e.title(), "Daily stats");
        assert!(e.public);
    }

    #[test]
    fn unregistered_paths_resolve_to_none() {
        let reg = registry();
        assert!(reg.resolve_by_route(&Method::GET, "/api/gadgets/1").is_none());
        assert!(reg.resolve_by_route(&Method::PATCH, "/api/widgets/1").is_none());
        assert!(reg.resolve_by_route(&Method::GET, "/api/widgets/1/extra").is_none());
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let mut reg = registry();
        assert!(matches!(
            reg.register_resource(resource("Widgets")),
            Err(ConfigError::DuplicatePath(_))
        ));
        let clash = EndpointDescriptor::custom(Method::GET, "widgets/{name}", Action::Custom, false);
        assert!(matches!(reg.register_endpoint(clash), Err(ConfigError::DuplicatePath(_))));
    }
}
