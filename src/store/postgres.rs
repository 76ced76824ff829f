//! PostgreSQL document store: one JSONB table per collection.

use async_trait::async_trait;
use bson::oid::ObjectId;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::pipeline::evaluate;
use super::{Document, DocumentStore, FindOptions};
use crate::error::StoreError;
use crate::migration::ensure_collections;
use crate::sql::{self, QueryBuf};

#[derive(Clone, Debug)]
pub struct PgDocumentStore {
    pool: PgPool,
    schema: String,
}

fn into_document(v: Value) -> Result<Document, StoreError> {
    match v {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(format!(
            "stored document is not an object: {}",
            other
        ))),
    }
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgDocumentStore {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn connect(database_url: &str, schema: impl Into<String>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, schema))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema and collection tables if missing.
    pub async fn bootstrap(&self, collections: &[String]) -> Result<(), StoreError> {
        ensure_collections(&self.pool, &self.schema, collections).await
    }

    async fn fetch_docs(&self, q: &QueryBuf) -> Result<Vec<Document>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, Value>(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(into_document).collect()
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

/// Leading `$match` stages are pushed into SQL; the rest runs in process.
fn split_leading_matches(pipeline: &[Value]) -> (Document, &[Value]) {
    let mut clauses = Vec::new();
    let mut rest = pipeline;
    while let Some((stage, tail)) = rest.split_first() {
        match stage.get("$match") {
            Some(Value::Object(filter)) if stage.as_object().map(|m| m.len()) == Some(1) => {
                clauses.push(Value::Object(filter.clone()));
                rest = tail;
            }
            _ => break,
        }
    }
    let mut filter = Document::new();
    if !clauses.is_empty() {
        filter.insert("$and".into(), Value::Array(clauses));
    }
    (filter, rest)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let q = sql::select_docs(
            &self.schema,
            collection,
            filter,
            Some(options.limit),
            Some(options.offset),
        )?;
        self.fetch_docs(&q).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError> {
        let q = sql::select_docs(&self.schema, collection, filter, Some(1), None)?;
        Ok(self.fetch_docs(&q).await?.into_iter().next())
    }

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        let q = sql::count_docs(&self.schema, collection, filter)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Value, StoreError> {
        let id = doc
            .entry("_id")
            .or_insert_with(|| Value::String(ObjectId::new().to_hex()))
            .clone();
        let key = match &id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let q = sql::insert_doc(&self.schema, collection, &key, &doc);
        self.execute(&q).await?;
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<u64, StoreError> {
        let q = sql::update_one(&self.schema, collection, filter, set)?;
        self.execute(&q).await
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        let q = sql::delete_one(&self.schema, collection, filter)?;
        self.execute(&q).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Document>, StoreError> {
        let (filter, rest) = split_leading_matches(pipeline);
        let q = sql::select_docs(&self.schema, collection, &filter, None, None)?;
        let docs = self.fetch_docs(&q).await?;
        evaluate(docs, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leading_matches_are_split_off() {
        let pipeline = vec![
            json!({"$match": {"is_deleted": false}}),
            json!({"$match": {"ticker": "ABC"}}),
            json!({"$group": {"_id": null, "n": {"$count": {}}}}),
            json!({"$match": {"n": {"$gt": 1}}}),
        ];
        let (filter, rest) = split_leading_matches(&pipeline);
        assert_eq!(
            Value::Object(filter),
            json!({"$and": [{"is_deleted": false}, {"ticker": "ABC"}]})
        );
        assert_eq!(rest.len(), 2);
    }
}
