//! Audit log schema
//!
//! Entries are only ever inserted. Nothing in the crate updates or deletes
//! them.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const AUDIT_LOG_COLLECTION: &str = "audit_logs";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AuditLogDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// `None` for system-initiated actions
    #[serde(default)]
    pub actor_id: Option<String>,

    /// Dotted action name, e.g. `mission.published`
    pub action: String,

    pub entity_type: String,

    pub entity_id: String,

    /// Changed fields or other context
    #[serde(default)]
    pub changes: serde_json::Value,

    #[serde(default)]
    pub ip_address: Option<String>,
}

impl Record for AuditLogDoc {
    const COLLECTION: &'static str = AUDIT_LOG_COLLECTION;

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
        vec![
            (
                doc! { "entity_type": 1, "entity_id": 1 },
                Some(IndexOptions::builder().name("entity_index".to_string()).build()),
            ),
            (
                doc! { "actor_id": 1 },
                Some(IndexOptions::builder().name("actor_index".to_string()).build()),
            ),
        ]
    }
}
