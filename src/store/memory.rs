//! In-process document store. Backs the demo server when no database is configured and
//! serves as the store in tests.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bson::oid::ObjectId;
use serde_json::Value;

use super::matcher::matches;
use super::pipeline::evaluate;
use super::{Document, DocumentStore, FindOptions};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Document>>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Document>>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn matching(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        let guard = self.read()?;
        let mut out = Vec::new();
        for doc in guard.get(collection).into_iter().flatten() {
            if matches(doc, filter)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }

    fn position(
        docs: &[Document],
        filter: &Document,
    ) -> Result<Option<usize>, StoreError> {
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .matching(collection, filter)?
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError> {
        let guard = self.read()?;
        let Some(docs) = guard.get(collection) else {
            return Ok(None);
        };
        Ok(Self::position(docs, filter)?.map(|i| docs[i].clone()))
    }

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        Ok(self.matching(collection, filter)?.len() as u64)
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Value, StoreError> {
        let id = doc
            .entry("_id")
            .or_insert_with(|| Value::String(ObjectId::new().to_hex()))
            .clone();
        let mut guard = self.write()?;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(StoreError::Backend(format!("duplicate _id {}", id)));
        }
        docs.push(doc);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<u64, StoreError> {
        let mut guard = self.write()?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let Some(i) = Self::position(docs, filter)? else {
            return Ok(0);
        };
        for (k, v) in set {
            docs[i].insert(k.clone(), v.clone());
        }
        Ok(1)
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        let mut guard = self.write()?;
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        match Self::position(docs, filter)? {
            Some(i) => {
                docs.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.read()?.get(collection).cloned().unwrap_or_default();
        evaluate(docs, pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_generates_object_id_and_finds_it() {
        let store = MemoryStore::new();
        let id = store.insert_one("widget", doc(json!({"name": "x"}))).await.unwrap();
        let hex = id.as_str().unwrap();
        assert!(ObjectId::parse_str(hex).is_ok());
        let found = store
            .find_one("widget", &doc(json!({"_id": hex})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["name"], "x");
    }

    #[tokio::test]
    async fn find_paginates_and_counts_under_filter() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store
                .insert_one("w", doc(json!({"n": i, "even": i % 2 == 0})))
                .await
                .unwrap();
        }
        let filter = doc(json!({"even": true}));
        let page = store
            .find("w", &filter, FindOptions { limit: 2, offset: 1 })
            .await
            .unwrap();
        assert_eq!(page.iter().map(|d| d["n"].clone()).collect::<Vec<_>>(), vec![json!(2), json!(4)]);
        assert_eq!(store.count("w", &filter).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn update_and_delete_touch_one_document() {
        let store = MemoryStore::new();
        store.insert_one("w", doc(json!({"k": 1}))).await.unwrap();
        store.insert_one("w", doc(json!({"k": 1}))).await.unwrap();
        let n = store
            .update_one("w", &doc(json!({"k": 1})), &doc(json!({"k": 2})))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.count("w", &doc(json!({"k": 2}))).await.unwrap(), 1);
        assert_eq!(store.delete_one("w", &doc(json!({"k": 9}))).await.unwrap(), 0);
        assert_eq!(store.delete_one("w", &doc(json!({"k": 2}))).await.unwrap(), 1);
        assert_eq!(store.count("w", &Document::new()).await.unwrap(), 1);
    }
}
