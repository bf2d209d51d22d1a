//! In-memory [`BlogStore`] backend.
//!
//! Records live in an ordered map keyed by object id, so iteration follows id
//! order, which for ids minted by one process is creation order. `find_all`
//! hands out a snapshot taken when the cursor is opened.

use super::{BlogDocument, BlogStore, RecordCursor, StoreError, StoreResult};
use futures::StreamExt;
use mongodb::bson::oid::ObjectId;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<ObjectId, BlogDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[tonic::async_trait]
impl BlogStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: &BlogDocument) -> StoreResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> StoreResult<Option<BlogDocument>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn replace(&self, record: &BlogDocument) -> StoreResult<()> {
        if let Some(slot) = self.records.write().get_mut(&record.id) {
            *slot = record.clone();
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: ObjectId) -> StoreResult<u64> {
        Ok(u64::from(self.records.write().remove(&id).is_some()))
    }

    async fn find_all(&self) -> StoreResult<RecordCursor> {
        let snapshot: Vec<BlogDocument> = self.records.read().values().cloned().collect();
        Ok(futures::stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }

    async fn shutdown(&self) -> StoreResult<()> {
        Ok(())
    }
}
