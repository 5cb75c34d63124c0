//! In-memory document store
//!
//! Backs dev mode and the test suite. One DashMap shard per collection;
//! version checks in `replace` run under the shard's write lock, so they are
//! atomic with respect to concurrent writers.

use async_trait::async_trait;
use bson::Document;
use dashmap::DashMap;
use mongodb::options::IndexOptions;
use std::collections::BTreeMap;

use crate::db::store::{matches_filter, stored_version, DocumentStore, ID_FIELD};
use crate::types::{ApiError, Result};

/// Document store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    /// collection -> (id -> document)
    collections: DashMap<String, BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection, deleted ones included
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

fn doc_id(doc: &Document) -> Result<String> {
    doc.get_str(ID_FIELD)
        .map(str::to_string)
        .map_err(|_| ApiError::Internal("document has no string id".into()))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_indexes(
        &self,
        _collection: &str,
        _indexes: Vec<(Document, Option<IndexOptions>)>,
    ) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<()> {
        let id = doc_id(&doc)?;
        let mut entries = self.collections.entry(collection.to_string()).or_default();
        if entries.contains_key(&id) {
            return Err(ApiError::Conflict(format!("Duplicate id {} in {}", id, collection)));
        }
        entries.insert(id, doc);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|entries| entries.get(id).cloned()))
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .get(collection)
            .map(|entries| {
                entries
                    .values()
                    .filter(|doc| matches_filter(doc, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_version: i64,
        doc: Document,
    ) -> Result<bool> {
        let Some(mut entries) = self.collections.get_mut(collection) else {
            return Ok(false);
        };
        match entries.get_mut(id) {
            Some(existing) if stored_version(existing) == expected_version => {
                *existing = doc;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn test_insert_get_find() {
        let store = MemoryStore::new();
        store
            .insert("shifts", doc! { "id": "s1", "mission_id": "m1" })
            .await
            .unwrap();
        store
            .insert("shifts", doc! { "id": "s2", "mission_id": "m2" })
            .await
            .unwrap();

        assert!(store.get("shifts", "s1").await.unwrap().is_some());
        assert!(store.get("shifts", "nope").await.unwrap().is_none());
        assert!(store.get("other", "s1").await.unwrap().is_none());

        let found = store.find("shifts", doc! { "mission_id": "m2" }).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("id").unwrap(), "s2");
        assert_eq!(store.len("shifts"), 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryStore::new();
        store.insert("users", doc! { "id": "u1" }).await.unwrap();
        assert!(matches!(
            store.insert("users", doc! { "id": "u1" }).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_checks_version() {
        let store = MemoryStore::new();
        store
            .insert("shifts", doc! { "id": "s1", "metadata": { "version": 1_i64 } })
            .await
            .unwrap();

        let next = doc! { "id": "s1", "metadata": { "version": 2_i64 } };
        assert!(!store.replace("shifts", "s1", 5, next.clone()).await.unwrap());
        assert!(store.replace("shifts", "s1", 1, next.clone()).await.unwrap());
        // Same expected version again loses: the stored one is now 2
        assert!(!store.replace("shifts", "s1", 1, next).await.unwrap());
        assert!(!store
            .replace("shifts", "missing", 1, doc! { "id": "missing" })
            .await
            .unwrap());
    }
}
