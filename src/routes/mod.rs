mod common;
mod resource;

pub use common::{common_routes, docs_routes};
pub use resource::api_routes;
