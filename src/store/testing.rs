use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Document, DocumentStore, FieldUpdate, MemoryStore, Query, StoreResult, WriteBatch};

/// Yields before every operation so concurrent callers interleave between
/// their reads and writes.
pub struct YieldingStore(pub Arc<MemoryStore>);

#[async_trait]
impl DocumentStore for YieldingStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        tokio::task::yield_now().await;
        self.0.get(collection, id).await
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.create(collection, id, data).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.set(collection, id, data).await
    }

    async fn update(&self, collection: &str, id: &str, fields: &[FieldUpdate]) -> StoreResult<Document> {
        tokio::task::yield_now().await;
        self.0.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.delete(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        tokio::task::yield_now().await;
        self.0.query(collection, query).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.commit(batch).await
    }
}
