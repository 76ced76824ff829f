//! Documentation endpoints: the generated document and its viewer.

use axum::{extract::State, response::Html, Json};
use serde_json::Value;

use crate::docs::SWAGGER_UI_HTML;
use crate::state::AppState;

pub async fn doc_json(State(state): State<AppState>) -> Json<Value> {
    Json(state.documentation.as_ref().clone())
}

pub async fn doc_ui() -> Html<&'static str> {
    Html(SWAGGER_UI_HTML)
}
