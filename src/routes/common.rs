//! Common routes: health, version and the documentation endpoints. None of them pass the
//! authorization gate.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::handlers::docs::{doc_json, doc_ui};
use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /version.
pub fn common_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// GET /doc.json, GET /doc/.
pub fn docs_routes() -> Router<AppState> {
    Router::new()
        .route("/doc.json", get(doc_json))
        .route("/doc/", get(doc_ui))
        .route("/doc", get(doc_ui))
}
