//! User document schema
//!
//! Stores credentials, role and department membership.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::collection::Record;
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    pub id: String,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// Login identifier, stored lowercase
    pub email: String,

    #[serde(default)]
    pub phone: Option<String>,

    /// Argon2 password hash
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,

    #[serde(default)]
    pub department_id: Option<String>,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Token version for invalidation (increment to invalidate all tokens)
    #[serde(default)]
    pub token_version: i32,

    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            name,
            email: normalize_email(&email),
            phone: None,
            password_hash,
            role,
            department_id: None,
            is_active: true,
            token_version: 1,
            last_login_at: None,
        }
    }
}

/// Emails compare case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Record for UserDoc {
    const COLLECTION: &'static str = USER_COLLECTION;

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
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "department_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("department_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
