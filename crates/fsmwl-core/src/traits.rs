use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{CollectionOptions, Document, Filter, Update, UpdateOptions, UpdateResult};

/// Trait for document store implementations a workload runs against.
#[async_trait]
pub trait DocStore: Send + Sync + 'static {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Create a collection. Fails if it already exists.
    async fn create_collection(
        &self,
        collection: &str,
        options: CollectionOptions,
    ) -> Result<(), StoreError>;

    /// Drop a collection. Returns false if it did not exist.
    async fn drop_collection(&self, collection: &str) -> Result<bool, StoreError>;

    /// Insert a single document. Implicitly creates the collection.
    async fn insert(&self, collection: &str, doc: Document) -> Result<(), StoreError>;

    /// Apply `update` to documents matching `filter`.
    ///
    /// With `options.upsert` set and nothing matched, a new document is
    /// inserted and reported through `n_upserted`.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> Result<UpdateResult, StoreError>;

    /// Return all documents matching `filter`, in insertion order.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        Ok(self.find(collection, filter).await?.len())
    }
}
