//! Resource Forge: model-driven REST endpoint synthesis over a document store.

pub mod app;
pub mod case;
pub mod config;
pub mod descriptor;
pub mod docs;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod migration;
pub mod query;
pub mod registry;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use app::App;
pub use config::{
    validate, AggregationConfig, AggregationMethod, FieldDef, FieldTypeConfig, Model, ModelDef,
    ResourceConfig, ResourceFlags, ServiceConfig,
};
pub use descriptor::{Action, EndpointDescriptor, ResourceDescriptor};
pub use error::{AppError, ConfigError, StoreError};
pub use extractors::AuthorizationContext;
pub use middleware::{AuthRejection, Authorizer};
pub use query::QueryFilter;
pub use response::{success_created, success_list, success_ok, Envelope};
pub use state::AppState;
pub use store::{Document, DocumentStore, FindOptions, MemoryStore, PgDocumentStore};
pub use service::CrudService;
