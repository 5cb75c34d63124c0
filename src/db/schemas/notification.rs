//! Per-user notification schema

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const NOTIFICATION_COLLECTION: &str = "notifications";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NotificationDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Recipient
    pub user_id: String,

    /// Machine-readable type, e.g. `participation.approved`
    pub kind: String,

    pub title: String,

    pub message: String,

    /// Related ids for client-side linking
    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationDoc {
    pub fn new(user_id: &str, kind: &str, title: String, message: String, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            title,
            message,
            data,
            read_at: None,
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

impl Record for NotificationDoc {
    const COLLECTION: &'static str = NOTIFICATION_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(IndexOptions::builder().name("user_index".to_string()).build()),
        )]
    }
}
