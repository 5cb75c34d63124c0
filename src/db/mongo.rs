//! MongoDB client and document store
//!
//! Pattern adapted from holo-host/rust/util_libs/db/src/mongodb

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};
use tracing::{debug, info};

use crate::db::store::{DocumentStore, ID_FIELD};
use crate::types::ApiError;

/// MongoDB duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, ApiError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| ApiError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ApiError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    fn raw(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection::<Document>(name)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl DocumentStore for MongoClient {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<(), ApiError> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| ApiError::Database(format!("MongoDB ping failed: {}", e)))
    }

    async fn ensure_indexes(
        &self,
        collection: &str,
        indexes: Vec<(Document, Option<IndexOptions>)>,
    ) -> Result<(), ApiError> {
        // Every collection is addressed by its string id
        let mut models = vec![IndexModel::builder()
            .keys(doc! { ID_FIELD: 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build()];

        models.extend(indexes.into_iter().map(|(keys, opts)| {
            IndexModel::builder().keys(keys).options(opts).build()
        }));

        self.raw(collection)
            .create_indexes(models)
            .await
            .map_err(|e| ApiError::Database(format!("Failed to create indexes: {}", e)))?;

        debug!(collection, "Indexes ensured");
        Ok(())
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<(), ApiError> {
        self.raw(collection).insert_one(doc).await.map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::Conflict("Η εγγραφή υπάρχει ήδη.".into())
            } else {
                ApiError::Database(format!("Insert failed: {}", e))
            }
        })?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ApiError> {
        self.raw(collection)
            .find_one(doc! { ID_FIELD: id })
            .await
            .map_err(|e| ApiError::Database(format!("Find failed: {}", e)))
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, ApiError> {
        let cursor = self
            .raw(collection)
            .find(filter)
            .await
            .map_err(|e| ApiError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| ApiError::Database(format!("Cursor failed: {}", e)))
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_version: i64,
        doc: Document,
    ) -> Result<bool, ApiError> {
        let result = self
            .raw(collection)
            .replace_one(doc! { ID_FIELD: id, "metadata.version": expected_version }, doc)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    ApiError::Conflict("Η εγγραφή υπάρχει ήδη.".into())
                } else {
                    ApiError::Database(format!("Replace failed: {}", e))
                }
            })?;

        Ok(result.matched_count == 1)
    }
}
