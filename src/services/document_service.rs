//! Document service - uploaded files and their visibility
//!
//! Metadata lives in the `documents` collection; bytes are written to
//! `<storage_dir>/<document id>`. Deleting a document is a soft delete and
//! keeps the file for history.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::permissions::{can_modify_document, can_view_document};
use crate::db::schemas::{DocumentDoc, Visibility};
use crate::db::Collections;
use crate::types::{ApiError, Result, Validator};

use super::pagination::{matches_search, Page, PageRequest};
use super::user_service::double_option;
use super::{AuditService, Caller};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UploadInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    /// File bytes, standard base64
    pub content: Option<String>,
    pub visibility: Option<Visibility>,
    pub department_id: Option<String>,
    pub mission_id: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DocumentUpdateInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    #[serde(default, with = "double_option")]
    pub department_id: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub mission_id: Option<Option<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DocumentFilter {
    pub mission_id: Option<String>,
    pub department_id: Option<String>,
    pub visibility: Option<Visibility>,
    pub search: Option<String>,
}

/// File bytes ready to be sent to the client
#[derive(Debug, Clone)]
pub struct Download {
    pub document: DocumentDoc,
    pub bytes: Vec<u8>,
}

pub struct DocumentService {
    collections: Collections,
    audit: Arc<AuditService>,
    storage_dir: PathBuf,
    max_upload_bytes: usize,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Το έγγραφο δεν βρέθηκε.".into())
}

/// Keep only the final path component and drop control characters
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

impl DocumentService {
    pub fn new(
        collections: Collections,
        audit: Arc<AuditService>,
        storage_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            collections,
            audit,
            storage_dir,
            max_upload_bytes,
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.storage_dir.join(id)
    }

    async fn load_visible(&self, caller: &Caller, id: &str) -> Result<DocumentDoc> {
        let document = self.collections.documents.get(id).await?.ok_or_else(not_found)?;
        if !can_view_document(&caller.actor, &document) {
            return Err(ApiError::Forbidden(
                "Δεν έχετε πρόσβαση σε αυτό το έγγραφο.".into(),
            ));
        }
        Ok(document)
    }

    async fn load_modifiable(&self, caller: &Caller, id: &str) -> Result<DocumentDoc> {
        let document = self.load_visible(caller, id).await?;
        if !can_modify_document(&caller.actor, &document) {
            return Err(ApiError::Forbidden(
                "Δεν έχετε δικαίωμα τροποποίησης αυτού του εγγράφου.".into(),
            ));
        }
        Ok(document)
    }

    async fn check_links(&self, department_id: Option<&str>, mission_id: Option<&str>) -> Result<()> {
        if let Some(dept) = department_id {
            if self.collections.departments.get(dept).await?.is_none() {
                return Err(ApiError::invalid_field("department_id", "Το τμήμα δεν υπάρχει."));
            }
        }
        if let Some(mission) = mission_id {
            if self.collections.missions.get(mission).await?.is_none() {
                return Err(ApiError::invalid_field("mission_id", "Η αποστολή δεν υπάρχει."));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Documents the caller may see, newest first
    pub async fn list(&self, caller: &Caller, filter: &DocumentFilter, page: PageRequest) -> Result<Page<DocumentDoc>> {
        let mut documents: Vec<DocumentDoc> = self
            .collections
            .documents
            .all()
            .await?
            .into_iter()
            .filter(|d| can_view_document(&caller.actor, d))
            .filter(|d| {
                filter
                    .mission_id
                    .as_deref()
                    .map_or(true, |m| d.mission_id.as_deref() == Some(m))
            })
            .filter(|d| {
                filter
                    .department_id
                    .as_deref()
                    .map_or(true, |m| d.department_id.as_deref() == Some(m))
            })
            .filter(|d| filter.visibility.map_or(true, |v| d.visibility == v))
            .filter(|d| {
                matches_search(
                    filter.search.as_deref(),
                    &[
                        Some(d.title.as_str()),
                        Some(d.file_name.as_str()),
                        d.description.as_deref(),
                    ],
                )
            })
            .collect();

        documents.sort_by(|a, b| b.metadata.created().cmp(&a.metadata.created()));
        Ok(Page::from_vec(documents, page))
    }

    pub async fn get(&self, caller: &Caller, id: &str) -> Result<DocumentDoc> {
        self.load_visible(caller, id).await
    }

    pub async fn download(&self, caller: &Caller, id: &str) -> Result<Download> {
        let document = self.load_visible(caller, id).await?;
        let bytes = tokio::fs::read(self.path_for(&document.id)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!(document_id = %document.id, "Document file missing from storage");
                ApiError::NotFound("Το αρχείο του εγγράφου δεν βρέθηκε.".into())
            } else {
                ApiError::Storage(format!("Failed to read document {}: {}", document.id, e))
            }
        })?;
        Ok(Download { document, bytes })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub async fn upload(&self, caller: &Caller, input: UploadInput) -> Result<DocumentDoc> {
        let mut v = Validator::new();
        v.required("title", input.title.as_deref())
            .max_len("title", input.title.as_deref(), 255)
            .max_len("description", input.description.as_deref(), 2000)
            .required("file_name", input.file_name.as_deref())
            .max_len("file_name", input.file_name.as_deref(), 255)
            .required("content", input.content.as_deref())
            .max_len("mime_type", input.mime_type.as_deref(), 127);
        v.finish()?;

        let bytes = STANDARD
            .decode(input.content.as_deref().unwrap_or_default().trim())
            .map_err(|_| ApiError::invalid_field("content", "Το περιεχόμενο δεν είναι έγκυρο base64."))?;
        if bytes.is_empty() {
            return Err(ApiError::invalid_field("content", "Το αρχείο είναι κενό."));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(ApiError::invalid_field(
                "content",
                format!(
                    "Το αρχείο ξεπερνά το μέγιστο επιτρεπτό μέγεθος ({} bytes).",
                    self.max_upload_bytes
                ),
            ));
        }

        // Department defaults to the uploader's own
        let department_id = input
            .department_id
            .or_else(|| caller.actor.department_id.clone());
        self.check_links(department_id.as_deref(), input.mission_id.as_deref())
            .await?;

        let document = DocumentDoc {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: caller.actor.id.clone(),
            department_id,
            mission_id: input.mission_id,
            title: input.title.unwrap_or_default().trim().to_string(),
            description: input.description,
            file_name: sanitize_file_name(input.file_name.as_deref().unwrap_or_default()),
            mime_type: input
                .mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size_bytes: bytes.len() as i64,
            sha256: hex::encode(Sha256::digest(&bytes)),
            visibility: input.visibility.unwrap_or_default(),
            ..Default::default()
        };

        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let path = self.path_for(&document.id);
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Document bytes stored");

        let document = match self.collections.documents.insert(document).await {
            Ok(document) => document,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), "Failed to remove orphaned upload: {}", rm);
                }
                return Err(e);
            }
        };

        self.audit
            .record(
                caller,
                "document.uploaded",
                "document",
                &document.id,
                json!({
                    "file_name": document.file_name,
                    "size_bytes": document.size_bytes,
                    "sha256": document.sha256,
                }),
            )
            .await;

        Ok(document)
    }

    pub async fn update(&self, caller: &Caller, id: &str, input: DocumentUpdateInput) -> Result<DocumentDoc> {
        let mut v = Validator::new();
        v.check(
            input.title.as_deref().map_or(true, |t| !t.trim().is_empty()),
            "title",
            "Το πεδίο title δεν μπορεί να είναι κενό.",
        )
        .max_len("title", input.title.as_deref(), 255)
        .max_len("description", input.description.as_deref(), 2000);
        v.finish()?;

        let mut document = self.load_modifiable(caller, id).await?;
        self.check_links(
            input.department_id.as_ref().and_then(|d| d.as_deref()),
            input.mission_id.as_ref().and_then(|m| m.as_deref()),
        )
        .await?;

        let mut changes = serde_json::Map::new();
        if let Some(title) = input.title {
            document.title = title.trim().to_string();
            changes.insert("title".into(), json!(document.title));
        }
        if let Some(description) = input.description {
            document.description = Some(description);
            changes.insert("description".into(), json!(document.description));
        }
        if let Some(visibility) = input.visibility {
            document.visibility = visibility;
            changes.insert("visibility".into(), json!(visibility));
        }
        if let Some(department_id) = input.department_id {
            document.department_id = department_id;
            changes.insert("department_id".into(), json!(document.department_id));
        }
        if let Some(mission_id) = input.mission_id {
            document.mission_id = mission_id;
            changes.insert("mission_id".into(), json!(document.mission_id));
        }

        let document = self.collections.documents.update(document).await?;
        self.audit
            .record(caller, "document.updated", "document", id, changes.into())
            .await;
        Ok(document)
    }

    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        let document = self.load_modifiable(caller, id).await?;
        self.collections.documents.soft_delete(document).await?;
        self.audit
            .record(caller, "document.deleted", "document", id, json!({}))
            .await;
        Ok(())
    }
}
