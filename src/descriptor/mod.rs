//! Registration-time metadata: fields, runtime shapes, resources and endpoints.

pub mod endpoint;
pub mod field;
pub mod resource;
pub mod shape;

pub use endpoint::{
    doc_path, normalize_route_path, synthesize, Action, EndpointDescriptor, EndpointHandler,
    EndpointKind, API_ROOT,
};
pub use field::{
    build_resource_shape, build_shape, Capability, FieldDescriptor, FieldType, ModelShape,
    DELETED_KEY, ID_KEY, ID_WIRE_KEY,
};
pub use resource::{DocumentHook, Hooks, PersistObserver, ResourceDescriptor};
pub use shape::{decode_document, encode_body};
