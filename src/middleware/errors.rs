//! Internal error redaction and the panic recovery boundary.

use std::any::Any;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::request_id::XRequestId;
use crate::response::Envelope;

pub const INTERNAL_MESSAGE: &str = "internal server error";

/// Outside debug mode, 500 bodies are replaced by an envelope carrying only the request id
/// under `error.error_id`. Headers other than the body framing are kept.
pub async fn redact_internal_errors(debug: bool, req: Request, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<XRequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();
    let response = next.run(req).await;
    if debug || response.status() != StatusCode::INTERNAL_SERVER_ERROR {
        return response;
    }

    let (parts, _) = response.into_parts();
    let body = Envelope::failure(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE,
        Some(json!({ "error_id": request_id })),
    );
    let mut redacted = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_LENGTH && name != header::CONTENT_TYPE {
            redacted.headers_mut().insert(name.clone(), value.clone());
        }
    }
    redacted
}

/// Response for `CatchPanicLayer::custom`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");
    let body = Envelope::failure(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE,
        Some(json!(detail)),
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_becomes_envelope() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
