//! Safe SQL builder: identifiers from registration only, values as JSONB parameters.

mod builder;
pub use builder::*;
