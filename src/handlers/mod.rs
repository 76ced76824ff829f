//! HTTP handlers for synthesized CRUD endpoints, aggregations and documentation.

pub mod aggregate;
pub mod crud;
pub mod docs;
