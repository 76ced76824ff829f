pub mod coerce;
pub mod filter;
pub mod pipeline;
pub mod value;

pub use coerce::coerce;
pub use filter::{build_filter, QueryFilter};
pub use pipeline::substitute;
pub use value::TypedValue;
