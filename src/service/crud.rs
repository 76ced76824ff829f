//! Generic CRUD execution against a document store.

use serde_json::Value;

use crate::descriptor::{
    decode_document, encode_body, ModelShape, ResourceDescriptor, DELETED_KEY, ID_KEY,
};
use crate::error::AppError;
use crate::query::QueryFilter;
use crate::store::{Document, DocumentStore, FindOptions};

pub struct CrudService;

/// One page of decoded items plus the count under the same filter.
#[derive(Debug)]
pub struct Page {
    pub items: Vec<Value>,
    pub total: u64,
}

impl CrudService {
    /// Fetch a page and the total count under `filter`.
    pub async fn list(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        filter: &QueryFilter,
        options: FindOptions,
    ) -> Result<Page, AppError> {
        let filter = filter.to_document();
        tracing::debug!(resource = %resource.name, ?filter, ?options, "list");
        let docs = store.find(&resource.collection, &filter, options).await?;
        let total = store.count(&resource.collection, &filter).await?;
        let items = docs
            .iter()
            .map(|d| decode_document(&resource.shape, d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total })
    }

    /// Fetch one item; `None` when nothing matches.
    pub async fn read(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        filter: &QueryFilter,
    ) -> Result<Option<Value>, AppError> {
        let filter = filter.to_document();
        tracing::debug!(resource = %resource.name, ?filter, "read");
        store
            .find_one(&resource.collection, &filter)
            .await?
            .map(|d| decode_document(&resource.shape, &d))
            .transpose()
    }

    /// Insert one item from a request body. Returns the persisted item.
    pub async fn create(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        body: &Value,
    ) -> Result<Value, AppError> {
        let mut doc = encode_body(&resource.shape, body)?;
        doc.remove(ID_KEY);
        if resource.flags.soft_delete {
            doc.insert(DELETED_KEY.into(), Value::Bool(false));
        }
        if let Some(hook) = &resource.hooks.before_insert {
            doc = hook(doc).map_err(|e| AppError::internal("hook error", e))?;
        }

        let id = store.insert_one(&resource.collection, doc).await?;
        tracing::debug!(resource = %resource.name, %id, "inserted");
        let item = Self::refetch(store, resource, id).await?;
        Self::after_persist(resource, &item)?;
        Ok(item)
    }

    /// Apply a request body to the first document matching `filter`. `None` when nothing
    /// matches.
    pub async fn update(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        filter: &QueryFilter,
        body: &Value,
    ) -> Result<Option<Value>, AppError> {
        let Some(existing) = store
            .find_one(&resource.collection, &filter.to_document())
            .await?
        else {
            return Ok(None);
        };
        let id = existing
            .get(ID_KEY)
            .cloned()
            .ok_or_else(|| AppError::internal("decode error", "stored document has no _id"))?;

        let mut set = encode_body(&resource.shape, body)?;
        set.remove(ID_KEY);
        if resource.flags.soft_delete {
            set.insert(DELETED_KEY.into(), Value::Bool(false));
        }
        if let Some(hook) = &resource.hooks.before_update {
            set = hook(set).map_err(|e| AppError::internal("hook error", e))?;
        }

        let by_id = Self::by_id(id.clone());
        let matched = store.update_one(&resource.collection, &by_id, &set).await?;
        if matched == 0 {
            return Ok(None);
        }
        let item = Self::refetch(store, resource, id).await?;
        Self::after_persist(resource, &item)?;
        Ok(Some(item))
    }

    /// Delete the first document matching `filter`; flips the deletion flag when soft delete
    /// is on. Returns the affected count.
    pub async fn delete(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        filter: &QueryFilter,
    ) -> Result<u64, AppError> {
        let filter = filter.to_document();
        let affected = if resource.flags.soft_delete {
            let mut set = Document::new();
            set.insert(DELETED_KEY.into(), Value::Bool(true));
            store.update_one(&resource.collection, &filter, &set).await?
        } else {
            store.delete_one(&resource.collection, &filter).await?
        };
        tracing::debug!(resource = %resource.name, affected, "delete");
        Ok(affected)
    }

    /// Run a pipeline and decode each row with the endpoint's response shape.
    pub async fn aggregate(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        pipeline: &[Value],
        response: Option<&ModelShape>,
    ) -> Result<Vec<Value>, AppError> {
        tracing::debug!(resource = %resource.name, stages = pipeline.len(), "aggregate");
        let rows = store.aggregate(&resource.collection, pipeline).await?;
        match response {
            Some(shape) => rows.iter().map(|r| decode_document(shape, r)).collect(),
            None => Ok(rows.into_iter().map(Value::Object).collect()),
        }
    }

    fn by_id(id: Value) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_KEY.into(), id);
        doc
    }

    async fn refetch(
        store: &dyn DocumentStore,
        resource: &ResourceDescriptor,
        id: Value,
    ) -> Result<Value, AppError> {
        let doc = store
            .find_one(&resource.collection, &Self::by_id(id))
            .await?
            .ok_or_else(|| AppError::internal("decode error", "persisted item not found"))?;
        decode_document(&resource.shape, &doc)
    }

    fn after_persist(resource: &ResourceDescriptor, item: &Value) -> Result<(), AppError> {
        match &resource.hooks.after_persist {
            Some(hook) => hook(item).map_err(|e| AppError::internal("hook error", e)),
            None => Ok(()),
        }
    }
}
