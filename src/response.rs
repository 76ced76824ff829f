//! Standard response envelope helpers.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::Value;

/// `{message, status_code, status, result}` on success,
/// `{message, status_code, status: false, error}` on failure.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: String,
    pub status_code: u16,
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn success(status: StatusCode, message: impl Into<String>, result: T) -> Self {
        Envelope {
            message: message.into(),
            status_code: status.as_u16(),
            status: true,
            result: Some(result),
            error: None,
        }
    }
}

impl Envelope<Value> {
    pub fn failure(status: StatusCode, message: impl Into<String>, error: Option<Value>) -> Self {
        Envelope {
            message: message.into(),
            status_code: status.as_u16(),
            status: false,
            result: None,
            error: Some(error.unwrap_or(Value::Null)),
        }
    }
}

/// List payload carried inside `result`.
#[derive(Debug, Serialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub start: u64,
}

pub fn success_ok<T: Serialize>(message: &str, result: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(Envelope::success(StatusCode::OK, message, result)),
    )
}

pub fn success_created<T: Serialize>(message: &str, result: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(Envelope::success(StatusCode::CREATED, message, result)),
    )
}

pub fn success_list<T: Serialize>(items: Vec<T>, total: u64, start: u64) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(Envelope::success(
            StatusCode::OK,
            "",
            ListResult { items, total, start },
        )),
    )
}
