//! Example server: registers resources from RESOURCES_PATH (or a built-in `Widget` resource),
//! uses PostgreSQL when DATABASE_URL is set and the in-memory store otherwise.

use std::sync::Arc;

use axum::{extract::State, Json};
use resource_forge::{
    config::load_resources_from_path, App, AppState, DocumentStore, FieldDef, FieldTypeConfig,
    MemoryStore, ModelDef, PgDocumentStore, ResourceConfig, ServiceConfig,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

fn widget() -> ResourceConfig {
    ResourceConfig::new(
        ModelDef::record("Widget")
            .field(FieldDef::new("Name", FieldTypeConfig::String).filter().required())
            .field(FieldDef::new("Price", FieldTypeConfig::Decimal))
            .field(FieldDef::new("CreatedAt", FieldTypeConfig::Timestamp)),
    )
    .soft_delete(true)
    .public(true)
}

async fn resource_names(State(state): State<AppState>) -> Json<Value> {
    let names: Vec<&str> = state
        .registry
        .resources()
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    Json(json!({ "resources": names }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("resource_forge=info".parse()?))
        .init();

    let config = ServiceConfig::from_env()?;
    let resources = match &config.resources_path {
        Some(path) => load_resources_from_path(path)?,
        None => vec![widget()],
    };

    let mut app = App::new(config);
    app.register_resources(resources)?;
    app.register_get_endpoint("/api/resources", true, None, None, resource_names)?
        .set_name("Registered resources")
        .add_tag("Meta");

    let store: Arc<dyn DocumentStore> = match app.config().database_url.clone() {
        Some(url) => {
            let store = PgDocumentStore::connect(&url, app.config().store_schema.clone()).await?;
            store.bootstrap(&app.collections()).await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    app.serve(store).await?;
    Ok(())
}
