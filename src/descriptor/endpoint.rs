//! Endpoint descriptors and CRUD endpoint synthesis.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::MethodRouter;
use serde_json::Value;

use super::field::ModelShape;
use super::resource::ResourceDescriptor;
use crate::case::slugify;
use crate::state::AppState;

/// Root every synthesized endpoint is mounted under.
pub const API_ROOT: &str = "/api";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Single,
    List,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Delete,
    Get,
    Update,
    List,
    Create,
    Aggregate,
    Custom,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Delete => "Delete",
            Action::Get => "Get",
            Action::Update => "Update",
            Action::List => "List",
            Action::Create => "Create",
            Action::Aggregate => "Aggregate",
            Action::Custom => "Custom",
        }
    }
}

/// What serves the endpoint. Synthesized CRUD and aggregation endpoints are bound to their
/// owning resource when the router is assembled; custom endpoints carry their own handler.
#[derive(Clone)]
pub enum EndpointHandler {
    Resource,
    Custom(MethodRouter<AppState>),
}

#[derive(Clone)]
pub struct EndpointDescriptor {
    pub method: Method,
    /// Route path relative to the API root, `:param` segments, e.g. `widget/:id` or `widget/`.
    pub path: String,
    /// Documentation path, e.g. `/api/widget/{id}`.
    pub doc_path: String,
    pub kind: EndpointKind,
    pub action: Action,
    pub public: bool,
    /// Canonical identifier, also the router's route name.
    pub name: String,
    /// Late-bound display name.
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Path parameter (wire key of the primary field) for single-item endpoints.
    pub path_param: Option<String>,
    pub query_shape: Option<Arc<ModelShape>>,
    pub request_shape: Option<Arc<ModelShape>>,
    pub response_shape: Option<Arc<ModelShape>>,
    /// Owning resource name; `None` for free-standing endpoints.
    pub resource: Option<String>,
    pub pipeline: Vec<Value>,
    pub handler: EndpointHandler,
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("public", &self.public)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl EndpointDescriptor {
    /// A free-standing or aggregation endpoint at `path` (relative to the API root).
    pub fn custom(method: Method, path: &str, action: Action, public: bool) -> Self {
        let path = normalize_route_path(path);
        EndpointDescriptor {
            name: slugify(&format!("{} {}", method, path)),
            doc_path: doc_path(&path),
            method,
            path,
            kind: EndpointKind::Custom,
            action,
            public,
            display_name: None,
            description: None,
            tags: Vec::new(),
            path_param: None,
            query_shape: None,
            request_shape: None,
            response_shape: None,
            resource: None,
            pipeline: Vec::new(),
            handler: EndpointHandler::Resource,
        }
    }

    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    /// Full router path, e.g. `/api/widget/:id`.
    pub fn mount_path(&self) -> String {
        format!("{}/{}", API_ROOT, self.path)
    }
}

/// Strip a leading `/` and the API root from a declared path; `{param}` segments become
/// `:param`.
pub fn normalize_route_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/');
    let root = API_ROOT.trim_start_matches('/');
    let rest = match trimmed.strip_prefix(root) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => trimmed,
    };
    rest.split('/')
        .map(|seg| match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(param) => format!(":{}", param),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `widget/:id` -> `/api/widget/{id}`
pub fn doc_path(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(param) => format!("{{{}}}", param),
            None => seg.to_string(),
        })
        .collect();
    format!("{}/{}", API_ROOT, segments.join("/"))
}

fn synthesized(
    resource: &ResourceDescriptor,
    method: Method,
    action: Action,
    single: bool,
) -> EndpointDescriptor {
    let param = resource.path_param();
    let path = if single {
        format!("{}/:{}", resource.path, param)
    } else {
        format!("{}/", resource.path)
    };
    let shape = Some(resource.shape.clone());
    let (query_shape, request_shape) = match action {
        Action::List => (resource.query_shape.clone(), None),
        Action::Create | Action::Update => (None, shape.clone()),
        _ => (None, None),
    };
    EndpointDescriptor {
        method,
        doc_path: doc_path(&path),
        path,
        kind: if single {
            EndpointKind::Single
        } else {
            EndpointKind::List
        },
        action,
        public: resource.flags.public,
        name: format!("{}{}", action.verb(), resource.name),
        display_name: None,
        description: None,
        tags: vec![resource.name.clone()],
        path_param: single.then(|| param.to_string()),
        query_shape,
        request_shape,
        response_shape: shape,
        resource: Some(resource.name.clone()),
        pipeline: Vec::new(),
        handler: EndpointHandler::Resource,
    }
}

/// The CRUD endpoint set implied by the resource's flags, in the fixed order
/// delete, get, update, list, create.
pub fn synthesize(resource: &ResourceDescriptor) -> Vec<EndpointDescriptor> {
    let flags = &resource.flags;
    let plan = [
        (flags.allow_delete, Method::DELETE, Action::Delete, true),
        (flags.allow_get, Method::GET, Action::Get, true),
        (flags.allow_update, Method::PUT, Action::Update, true),
        (flags.allow_list, Method::GET, Action::List, false),
        (flags.allow_insert, Method::POST, Action::Create, false),
    ];
    plan.into_iter()
        .filter(|(allowed, ..)| *allowed)
        .map(|(_, method, action, single)| synthesized(resource, method, action, single))
        .collect()
}
