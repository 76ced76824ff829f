//! Request pipeline layers: request id, error redaction and the authorization gate.

pub mod auth;
pub mod errors;
pub mod request_id;

pub use auth::{authorization_gate, AuthRejection, Authorizer, ENDPOINT_NAME_HEADER};
pub use errors::{panic_response, redact_internal_errors};
pub use request_id::{MakeReqId, XRequestId};
