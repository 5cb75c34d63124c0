//! Department service - the organizational tree
//!
//! Every authenticated user may browse departments; only system
//! administrators change them.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::schemas::DepartmentDoc;
use crate::db::Collections;
use crate::types::{ApiError, Result, Validator};

use super::pagination::{matches_search, Page, PageRequest};
use super::user_service::double_option;
use super::{AuditService, Caller};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DepartmentFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub parent_id: Option<String>,
    /// Return the nested tree instead of a flat page
    #[serde(default)]
    pub tree: bool,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DepartmentInput {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` moves the department to the root
    #[serde(default, with = "double_option")]
    pub parent_id: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// A department with its nested children
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentNode {
    #[serde(flatten)]
    pub department: DepartmentDoc,
    pub children: Vec<DepartmentNode>,
}

/// A department with its direct children
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentDetail {
    #[serde(flatten)]
    pub department: DepartmentDoc,
    pub parent: Option<DepartmentDoc>,
    pub children: Vec<DepartmentDoc>,
}

pub struct DepartmentService {
    collections: Collections,
    audit: Arc<AuditService>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Το τμήμα δεν βρέθηκε.".into())
}

impl DepartmentService {
    pub fn new(collections: Collections, audit: Arc<AuditService>) -> Self {
        Self { collections, audit }
    }

    fn require_system_admin(caller: &Caller) -> Result<()> {
        if caller.actor.is_system_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Μόνο οι διαχειριστές συστήματος μπορούν να διαχειριστούν τμήματα.".into(),
            ))
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub async fn list(&self, filter: &DepartmentFilter, page: PageRequest) -> Result<Page<DepartmentDoc>> {
        let mut departments: Vec<DepartmentDoc> = self
            .collections
            .departments
            .all()
            .await?
            .into_iter()
            .filter(|d| filter.is_active.map_or(true, |a| d.is_active == a))
            .filter(|d| {
                filter
                    .parent_id
                    .as_deref()
                    .map_or(true, |p| d.parent_id.as_deref() == Some(p))
            })
            .filter(|d| {
                matches_search(
                    filter.search.as_deref(),
                    &[Some(d.name.as_str()), d.description.as_deref()],
                )
            })
            .collect();

        departments.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(Page::from_vec(departments, page))
    }

    /// Root departments with their descendants nested
    pub async fn tree(&self) -> Result<Vec<DepartmentNode>> {
        let departments = self.collections.departments.all().await?;
        let ids: HashSet<String> = departments.iter().map(|d| d.id.clone()).collect();

        let mut by_parent: HashMap<Option<String>, Vec<DepartmentDoc>> = HashMap::new();
        for dept in departments {
            // Children of a deleted parent surface at the root
            let parent = dept.parent_id.clone().filter(|p| ids.contains(p));
            by_parent.entry(parent).or_default().push(dept);
        }

        Ok(build_nodes(&mut by_parent, None))
    }

    pub async fn get(&self, id: &str) -> Result<DepartmentDetail> {
        let department = self.collections.departments.get(id).await?.ok_or_else(not_found)?;

        let parent = match department.parent_id.as_deref() {
            Some(parent_id) => self.collections.departments.get(parent_id).await?,
            None => None,
        };
        let mut children = self
            .collections
            .departments
            .find(bson::doc! { "parent_id": id })
            .await?;
        children.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(DepartmentDetail {
            department,
            parent,
            children,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    fn validate(input: &DepartmentInput, creating: bool) -> Result<()> {
        let mut v = Validator::new();
        if creating {
            v.required("name", input.name.as_deref());
        } else {
            v.check(
                input.name.as_deref().map_or(true, |n| !n.trim().is_empty()),
                "name",
                "Το πεδίο name δεν μπορεί να είναι κενό.",
            );
        }
        v.max_len("name", input.name.as_deref(), 255)
            .max_len("description", input.description.as_deref(), 2000);
        v.finish()
    }

    async fn require_parent(&self, parent_id: &str) -> Result<()> {
        if self.collections.departments.get(parent_id).await?.is_none() {
            return Err(ApiError::invalid_field(
                "parent_id",
                "Το γονικό τμήμα δεν υπάρχει.",
            ));
        }
        Ok(())
    }

    /// Refuse a parent that is the department itself or one of its descendants
    async fn check_cycle(&self, id: &str, new_parent: &str) -> Result<()> {
        let cycle = || ApiError::invalid_field("parent_id", "Ένα τμήμα δεν μπορεί να γίνει πρόγονος του εαυτού του.");

        let mut seen = HashSet::new();
        let mut current = Some(new_parent.to_string());
        while let Some(ancestor) = current {
            if ancestor == id {
                return Err(cycle());
            }
            if !seen.insert(ancestor.clone()) {
                // Stored data already loops; refuse rather than spin
                return Err(cycle());
            }
            current = self
                .collections
                .departments
                .get_with_deleted(&ancestor)
                .await?
                .and_then(|d| d.parent_id);
        }
        Ok(())
    }

    pub async fn create(&self, caller: &Caller, input: DepartmentInput) -> Result<DepartmentDoc> {
        Self::require_system_admin(caller)?;
        Self::validate(&input, true)?;

        let parent_id = input.parent_id.flatten();
        if let Some(ref parent) = parent_id {
            self.require_parent(parent).await?;
        }

        let mut department = DepartmentDoc::new(
            input.name.unwrap_or_default().trim().to_string(),
            input.description,
            parent_id,
        );
        department.is_active = input.is_active.unwrap_or(true);
        let department = self.collections.departments.insert(department).await?;

        self.audit
            .record(
                caller,
                "department.created",
                "department",
                &department.id,
                json!({ "name": department.name, "parent_id": department.parent_id }),
            )
            .await;

        Ok(department)
    }

    pub async fn update(&self, caller: &Caller, id: &str, input: DepartmentInput) -> Result<DepartmentDoc> {
        Self::require_system_admin(caller)?;
        Self::validate(&input, false)?;

        let mut department = self.collections.departments.get(id).await?.ok_or_else(not_found)?;

        if let Some(Some(ref parent)) = input.parent_id {
            self.require_parent(parent).await?;
            self.check_cycle(id, parent).await?;
        }

        let mut changes = serde_json::Map::new();
        if let Some(name) = input.name {
            department.name = name.trim().to_string();
            changes.insert("name".into(), json!(department.name));
        }
        if let Some(description) = input.description {
            department.description = Some(description);
            changes.insert("description".into(), json!(department.description));
        }
        if let Some(parent_id) = input.parent_id {
            department.parent_id = parent_id;
            changes.insert("parent_id".into(), json!(department.parent_id));
        }
        if let Some(active) = input.is_active {
            department.is_active = active;
            changes.insert("is_active".into(), json!(active));
        }

        let department = self.collections.departments.update(department).await?;
        self.audit
            .record(caller, "department.updated", "department", id, changes.into())
            .await;

        Ok(department)
    }

    /// Soft delete; refused while live child departments remain
    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        Self::require_system_admin(caller)?;

        let department = self.collections.departments.get(id).await?.ok_or_else(not_found)?;

        let children = self
            .collections
            .departments
            .find(bson::doc! { "parent_id": id })
            .await?;
        if !children.is_empty() {
            return Err(ApiError::invalid_field(
                "department",
                "Το τμήμα έχει υποτμήματα και δεν μπορεί να διαγραφεί.",
            ));
        }

        self.collections.departments.soft_delete(department).await?;
        self.audit
            .record(caller, "department.deleted", "department", id, json!({}))
            .await;
        Ok(())
    }
}

fn build_nodes(
    by_parent: &mut HashMap<Option<String>, Vec<DepartmentDoc>>,
    parent: Option<String>,
) -> Vec<DepartmentNode> {
    let mut level = by_parent.remove(&parent).unwrap_or_default();
    level.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    level
        .into_iter()
        .map(|department| {
            let children = build_nodes(by_parent, Some(department.id.clone()));
            DepartmentNode {
                department,
                children,
            }
        })
        .collect()
}
