//! Storage backend abstraction
//!
//! Services never talk to a driver directly. They go through
//! [`crate::db::Collection`], which serializes records to BSON documents and
//! hands them to a [`DocumentStore`]. MongoDB backs production; the memory
//! store backs dev mode and tests.

use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::options::IndexOptions;

use crate::types::Result;

/// Field holding the record id in every stored document
pub const ID_FIELD: &str = "id";

/// Minimal document store
///
/// Filters are equality-only on top-level fields: `doc! { "mission_id": id }`
/// matches documents whose `mission_id` equals `id`. Anything richer is done
/// by the caller over the returned records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Verify the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Create schema-defined indexes (no-op for backends without indexes)
    async fn ensure_indexes(
        &self,
        collection: &str,
        indexes: Vec<(Document, Option<IndexOptions>)>,
    ) -> Result<()>;

    async fn insert(&self, collection: &str, doc: Document) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>>;

    /// Replace the document only if its stored `metadata.version` still equals
    /// `expected_version`. Returns `false` when the version moved on or the
    /// document is gone.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_version: i64,
        doc: Document,
    ) -> Result<bool>;
}

/// Read `metadata.version` out of a raw document
pub fn stored_version(doc: &Document) -> i64 {
    doc.get_document("metadata")
        .ok()
        .and_then(|m| match m.get("version") {
            Some(Bson::Int64(v)) => Some(*v),
            Some(Bson::Int32(v)) => Some(i64::from(*v)),
            _ => None,
        })
        .unwrap_or(0)
}

/// Equality match of every filter field against a document
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| match doc.get(key) {
        Some(actual) => actual == expected,
        None => matches!(expected, Bson::Null),
    })
}
