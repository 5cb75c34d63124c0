//! Department document schema
//!
//! Departments form a tree through `parent_id`. Deleting one is a soft
//! delete, so missions and children keep resolving their parent.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const DEPARTMENT_COLLECTION: &str = "departments";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DepartmentDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl DepartmentDoc {
    pub fn new(name: String, description: Option<String>, parent_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            name,
            description,
            parent_id,
            is_active: true,
        }
    }
}

impl Record for DepartmentDoc {
    const COLLECTION: &'static str = DEPARTMENT_COLLECTION;

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
            doc! { "parent_id": 1 },
            Some(IndexOptions::builder().name("parent_index".to_string()).build()),
        )]
    }
}
