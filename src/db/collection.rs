//! Typed collections over a [`DocumentStore`]
//!
//! Handles metadata stamping, soft-delete filtering and versioned updates so
//! services only deal with record structs.

use bson::Document;
use chrono::Utc;
use mongodb::options::IndexOptions;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::db::schemas::Metadata;
use crate::db::store::DocumentStore;
use crate::types::{ApiError, Result};

/// A stored entity
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Collection the entity lives in
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Schema-defined secondary indexes
    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}

/// Typed view of one collection
pub struct Collection<T: Record> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Apply schema-defined indexes
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.store.ensure_indexes(T::COLLECTION, T::indexes()).await
    }

    fn decode(doc: Document) -> Result<T> {
        Ok(bson::from_document(doc)?)
    }

    /// Insert a new record, stamping creation metadata
    pub async fn insert(&self, mut item: T) -> Result<T> {
        let now = Utc::now();
        let metadata = item.metadata_mut();
        metadata.is_deleted = false;
        metadata.deleted_at = None;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);
        metadata.version = 1;

        let doc = bson::to_document(&item)?;
        self.store.insert(T::COLLECTION, doc).await?;
        Ok(item)
    }

    /// Live record by id
    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self
            .get_with_deleted(id)
            .await?
            .filter(|item| !item.metadata().is_deleted))
    }

    /// Record by id, soft-deleted ones included
    pub async fn get_with_deleted(&self, id: &str) -> Result<Option<T>> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Live record by id or a 404 carrying `message`
    pub async fn require(&self, id: &str, message: &str) -> Result<T> {
        self.get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(message.to_string()))
    }

    /// Live records matching an equality filter
    pub async fn find(&self, filter: Document) -> Result<Vec<T>> {
        Ok(self
            .find_with_deleted(filter)
            .await?
            .into_iter()
            .filter(|item| !item.metadata().is_deleted)
            .collect())
    }

    /// Matching records, soft-deleted ones included
    pub async fn find_with_deleted(&self, filter: Document) -> Result<Vec<T>> {
        self.store
            .find(T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    /// Every live record
    pub async fn all(&self) -> Result<Vec<T>> {
        self.find(Document::new()).await
    }

    /// Write back a record read earlier.
    ///
    /// Fails with [`ApiError::Conflict`] when someone else wrote it in the
    /// meantime; the caller decides whether to re-read and retry.
    pub async fn update(&self, mut item: T) -> Result<T> {
        let expected = item.metadata().version;
        let metadata = item.metadata_mut();
        metadata.version = expected + 1;
        metadata.updated_at = Some(Utc::now());

        let doc = bson::to_document(&item)?;
        if self
            .store
            .replace(T::COLLECTION, &item.id().to_string(), expected, doc)
            .await?
        {
            Ok(item)
        } else {
            Err(ApiError::Conflict(
                "Η εγγραφή τροποποιήθηκε ταυτόχρονα. Δοκιμάστε ξανά.".into(),
            ))
        }
    }

    /// Mark a record deleted; it stays readable through `*_with_deleted`
    pub async fn soft_delete(&self, mut item: T) -> Result<T> {
        let metadata = item.metadata_mut();
        metadata.is_deleted = true;
        metadata.deleted_at = Some(Utc::now());
        self.update(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::DepartmentDoc;
    use crate::db::MemoryStore;
    use bson::doc;

    fn departments() -> Collection<DepartmentDoc> {
        Collection::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_insert_stamps_metadata() {
        let coll = departments();
        let dept = coll
            .insert(DepartmentDoc::new("Logistics".into(), None, None))
            .await
            .unwrap();
        assert_eq!(dept.metadata.version, 1);
        assert!(dept.metadata.created_at.is_some());

        let loaded = coll.get(&dept.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Logistics");
        assert_eq!(loaded.metadata.version, 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let coll = departments();
        let dept = coll
            .insert(DepartmentDoc::new("Medical".into(), None, None))
            .await
            .unwrap();

        let mut first = dept.clone();
        first.name = "Medical Team".into();
        let first = coll.update(first).await.unwrap();
        assert_eq!(first.metadata.version, 2);

        let mut stale = dept;
        stale.name = "Lost write".into();
        assert!(matches!(coll.update(stale).await, Err(ApiError::Conflict(_))));

        assert_eq!(coll.get(&first.id).await.unwrap().unwrap().name, "Medical Team");
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_history() {
        let coll = departments();
        let parent = coll
            .insert(DepartmentDoc::new("Root".into(), None, None))
            .await
            .unwrap();
        coll.insert(DepartmentDoc::new("Child".into(), None, Some(parent.id.clone())))
            .await
            .unwrap();

        coll.soft_delete(parent.clone()).await.unwrap();

        assert!(coll.get(&parent.id).await.unwrap().is_none());
        let history = coll.get_with_deleted(&parent.id).await.unwrap().unwrap();
        assert!(history.metadata.is_deleted);
        assert!(history.metadata.deleted_at.is_some());

        let children = coll
            .find(doc! { "parent_id": parent.id.as_str() })
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(coll.all().await.unwrap().len(), 1);
    }
}
