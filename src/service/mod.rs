//! CrudService: store operations per CRUD action.

mod crud;
pub use crud::{CrudService, Page};
