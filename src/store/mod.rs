//! Document store boundary. Handlers talk to a `DocumentStore`; backends are the in-memory
//! store and the PostgreSQL JSONB store.

pub mod matcher;
pub mod memory;
pub mod pipeline;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// A stored or to-be-stored document, keyed by storage keys.
pub type Document = serde_json::Map<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub limit: u64,
    pub offset: u64,
}

/// Filter-based access to named collections. Filters use the `$and` / comparison-operator
/// vocabulary produced by `QueryFilter::to_document`; pipelines use the stage vocabulary
/// evaluated by `store::pipeline`.
///
/// Dropping a returned future abandons the operation; request timeouts rely on this.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, StoreError>;

    /// Insert and return the document's identity (`_id`), generating an ObjectId when absent.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Value, StoreError>;

    /// Merge `set` into the first document matching `filter`. Returns the matched count.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> Result<u64, StoreError>;

    /// Remove the first document matching `filter`. Returns the removed count.
    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Document>, StoreError>;
}
