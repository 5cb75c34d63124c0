//! Document (uploaded file) schema
//!
//! Only metadata lives in the database; the bytes are written to the
//! storage directory under the document id.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const DOCUMENT_COLLECTION: &str = "documents";

/// Who may see a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Every authenticated user
    Public,
    /// Members and managers of the document's department
    #[default]
    Department,
    /// System and department administrators
    Admins,
    /// Owner and system administrators
    Private,
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Visibility::Public),
            "DEPARTMENT" => Ok(Visibility::Department),
            "ADMINS" => Ok(Visibility::Admins),
            "PRIVATE" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DocumentDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub owner_id: String,

    #[serde(default)]
    pub department_id: Option<String>,

    #[serde(default)]
    pub mission_id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    pub file_name: String,

    pub mime_type: String,

    pub size_bytes: i64,

    /// Hex-encoded SHA-256 of the stored bytes
    pub sha256: String,

    #[serde(default)]
    pub visibility: Visibility,
}

impl Record for DocumentDoc {
    const COLLECTION: &'static str = DOCUMENT_COLLECTION;

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
            doc! { "owner_id": 1 },
            Some(IndexOptions::builder().name("owner_index".to_string()).build()),
        )]
    }
}
