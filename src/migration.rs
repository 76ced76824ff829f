//! Create the storage schema and one JSONB table per registered collection.
//! Idempotent (IF NOT EXISTS); previously stored documents are never rewritten.

use sqlx::PgPool;

use crate::error::StoreError;
use crate::sql::{create_collection, quoted};

pub async fn ensure_collections(
    pool: &PgPool,
    schema: &str,
    collections: &[String],
) -> Result<(), StoreError> {
    let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema));
    tracing::debug!(sql = %sql, "migration");
    sqlx::query(&sql).execute(pool).await?;

    for collection in collections {
        let ddl = create_collection(schema, collection);
        tracing::debug!(sql = %ddl, "migration");
        sqlx::query(&ddl).execute(pool).await?;
    }
    tracing::info!(schema, count = collections.len(), "collection tables ready");
    Ok(())
}
