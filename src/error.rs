//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use thiserror::Error;

use crate::response::Envelope;

/// Failures while turning model and resource definitions into descriptors.
/// These happen before the service accepts traffic and abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("model '{model}' is not a record type")]
    NotARecord { model: String },
    #[error("model '{model}': duplicate {kind} key '{key}'")]
    DuplicateKey {
        model: String,
        kind: &'static str,
        key: String,
    },
    #[error("model '{model}': more than one primary field ({first}, {second})")]
    MultiplePrimary {
        model: String,
        first: String,
        second: String,
    },
    #[error("field '{field}': invalid capability tag '{tag}'")]
    InvalidCapability { field: String, tag: String },
    #[error("duplicate path: {0}")]
    DuplicatePath(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failures reported by a document store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported pipeline stage: {0}")]
    UnsupportedStage(String),
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
    #[error("store: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{message}")]
    BadRequest {
        message: String,
        detail: Option<String>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Unauthorized {
        status: StatusCode,
        message: String,
        detail: String,
    },
    #[error("{message}")]
    Internal {
        message: String,
        detail: Option<String>,
    },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, detail: impl ToString) -> Self {
        AppError::BadRequest {
            message: message.into(),
            detail: Some(detail.to_string()),
        }
    }

    pub fn internal(message: impl Into<String>, detail: impl ToString) -> Self {
        AppError::Internal {
            message: message.into(),
            detail: Some(detail.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized { status, .. } => *status,
            AppError::Config(_) | AppError::Store(_) | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message_and_detail(&self) -> (String, Option<Value>) {
        match self {
            AppError::Config(e) => ("internal server error".into(), Some(Value::String(e.to_string()))),
            AppError::Store(e) => ("server error".into(), Some(Value::String(e.to_string()))),
            AppError::BadRequest { message, detail } => {
                (message.clone(), detail.clone().map(Value::String))
            }
            AppError::NotFound(message) => (message.clone(), None),
            AppError::Unauthorized { message, detail, .. } => {
                (message.clone(), Some(Value::String(detail.clone())))
            }
            AppError::Internal { message, detail } => {
                (message.clone(), detail.clone().map(Value::String))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let (message, detail) = self.message_and_detail();
        let body = Envelope::failure(status, message, detail);
        (status, Json(body)).into_response()
    }
}
