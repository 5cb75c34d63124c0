//! User service - administration of user accounts
//!
//! System administrators list, create and edit users of every role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{check_new_password, hash_password, Role};
use crate::db::schemas::{normalize_email, UserDoc};
use crate::db::Collections;
use crate::types::{ApiError, Result, Validator};

use super::pagination::{matches_search, Page, PageRequest};
use super::{AuditService, Caller};

use std::sync::Arc;

/// User as returned by the API, without credentials
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub department_id: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&UserDoc> for UserView {
    fn from(user: &UserDoc) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            department_id: user.department_id.clone(),
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.metadata.created_at,
            updated_at: user.metadata.updated_at,
        }
    }
}

/// Query parameters for listing users
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department_id: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CreateUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    /// `Some(None)` clears the department
    #[serde(default, with = "double_option")]
    pub department_id: Option<Option<String>>,
    pub is_active: Option<bool>,
}

/// Distinguishes an absent field from an explicit `null`
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

pub struct UserService {
    collections: Collections,
    audit: Arc<AuditService>,
}

impl UserService {
    pub fn new(collections: Collections, audit: Arc<AuditService>) -> Self {
        Self { collections, audit }
    }

    fn require_system_admin(caller: &Caller) -> Result<()> {
        if caller.actor.is_system_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Μόνο οι διαχειριστές συστήματος μπορούν να διαχειριστούν χρήστες.".into(),
            ))
        }
    }

    /// Whether an email is taken by any user, deleted ones included
    pub(crate) async fn email_taken(&self, email: &str, except_id: Option<&str>) -> Result<bool> {
        Ok(self
            .collections
            .users
            .find_with_deleted(bson::doc! { "email": normalize_email(email) })
            .await?
            .iter()
            .any(|u| Some(u.id.as_str()) != except_id))
    }

    async fn require_department(&self, department_id: &str) -> Result<()> {
        if self.collections.departments.get(department_id).await?.is_none() {
            return Err(ApiError::invalid_field(
                "department_id",
                "Το τμήμα δεν υπάρχει.",
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub async fn list(
        &self,
        caller: &Caller,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<UserView>> {
        Self::require_system_admin(caller)?;

        let mut users: Vec<UserDoc> = self
            .collections
            .users
            .all()
            .await?
            .into_iter()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| {
                filter
                    .department_id
                    .as_deref()
                    .map_or(true, |d| u.department_id.as_deref() == Some(d))
            })
            .filter(|u| filter.is_active.map_or(true, |a| u.is_active == a))
            .filter(|u| {
                matches_search(
                    filter.search.as_deref(),
                    &[Some(u.name.as_str()), Some(u.email.as_str()), u.phone.as_deref()],
                )
            })
            .collect();

        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(Page::from_vec(users, page).map(|u| UserView::from(&u)))
    }

    pub async fn get(&self, caller: &Caller, id: &str) -> Result<UserView> {
        if caller.actor.id != id {
            Self::require_system_admin(caller)?;
        }
        let user = self
            .collections
            .users
            .require(id, "Ο χρήστης δεν βρέθηκε.")
            .await?;
        Ok(UserView::from(&user))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub async fn create(&self, caller: &Caller, input: CreateUserInput) -> Result<UserView> {
        Self::require_system_admin(caller)?;

        let mut v = Validator::new();
        v.required("name", input.name.as_deref())
            .max_len("name", input.name.as_deref(), 255)
            .required("email", input.email.as_deref())
            .email("email", input.email.as_deref())
            .max_len("phone", input.phone.as_deref(), 32);
        check_new_password(&mut v, "password", input.password.as_deref(), None);
        v.finish()?;

        let (Some(name), Some(email), Some(password)) = (input.name, input.email, input.password)
        else {
            return Err(ApiError::BadRequest("Λείπουν υποχρεωτικά πεδία.".into()));
        };

        if self.email_taken(&email, None).await? {
            return Err(ApiError::invalid_field("email", "Το email χρησιμοποιείται ήδη."));
        }
        if let Some(ref dept) = input.department_id {
            self.require_department(dept).await?;
        }

        let mut user = UserDoc::new(
            name.trim().to_string(),
            email,
            hash_password(&password)?,
            input.role.unwrap_or_default(),
        );
        user.phone = input.phone;
        user.department_id = input.department_id;
        user.is_active = input.is_active.unwrap_or(true);

        let user = self.collections.users.insert(user).await?;

        self.audit
            .record(
                caller,
                "user.created",
                "user",
                &user.id,
                json!({ "email": user.email, "role": user.role }),
            )
            .await;

        Ok(UserView::from(&user))
    }

    pub async fn update(&self, caller: &Caller, id: &str, input: UpdateUserInput) -> Result<UserView> {
        Self::require_system_admin(caller)?;

        let mut v = Validator::new();
        v.max_len("name", input.name.as_deref(), 255)
            .check(
                input.name.as_deref().map_or(true, |n| !n.trim().is_empty()),
                "name",
                "Το πεδίο name δεν μπορεί να είναι κενό.",
            )
            .max_len("phone", input.phone.as_deref(), 32);
        v.finish()?;

        let mut user = self
            .collections
            .users
            .require(id, "Ο χρήστης δεν βρέθηκε.")
            .await?;

        if caller.actor.id == user.id && input.is_active == Some(false) {
            return Err(ApiError::Forbidden(
                "Δεν μπορείτε να απενεργοποιήσετε τον δικό σας λογαριασμό.".into(),
            ));
        }
        if let Some(Some(ref dept)) = input.department_id {
            self.require_department(dept).await?;
        }

        let mut changes = serde_json::Map::new();
        if let Some(name) = input.name {
            user.name = name.trim().to_string();
            changes.insert("name".into(), json!(user.name));
        }
        if let Some(phone) = input.phone {
            user.phone = Some(phone).filter(|p| !p.trim().is_empty());
            changes.insert("phone".into(), json!(user.phone));
        }
        if let Some(role) = input.role {
            if role != user.role {
                changes.insert("role".into(), json!({ "from": user.role, "to": role }));
                user.role = role;
                // Tokens carry the role; force a fresh login
                user.token_version += 1;
            }
        }
        if let Some(department_id) = input.department_id {
            user.department_id = department_id;
            changes.insert("department_id".into(), json!(user.department_id));
        }
        if let Some(active) = input.is_active {
            if active != user.is_active {
                user.is_active = active;
                if !active {
                    user.token_version += 1;
                }
                changes.insert("is_active".into(), json!(active));
            }
        }

        let user = self.collections.users.update(user).await?;
        self.audit
            .record(caller, "user.updated", "user", &user.id, changes.into())
            .await;

        Ok(UserView::from(&user))
    }

    /// Flip the active flag; deactivation revokes outstanding tokens
    pub async fn toggle_active(&self, caller: &Caller, id: &str) -> Result<UserView> {
        Self::require_system_admin(caller)?;

        let mut user = self
            .collections
            .users
            .require(id, "Ο χρήστης δεν βρέθηκε.")
            .await?;
        if caller.actor.id == user.id {
            return Err(ApiError::Forbidden(
                "Δεν μπορείτε να απενεργοποιήσετε τον δικό σας λογαριασμό.".into(),
            ));
        }

        user.is_active = !user.is_active;
        if !user.is_active {
            user.token_version += 1;
        }
        let user = self.collections.users.update(user).await?;

        self.audit
            .record(
                caller,
                if user.is_active { "user.activated" } else { "user.deactivated" },
                "user",
                &user.id,
                json!({ "is_active": user.is_active }),
            )
            .await;

        Ok(UserView::from(&user))
    }

    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        Self::require_system_admin(caller)?;

        let mut user = self
            .collections
            .users
            .require(id, "Ο χρήστης δεν βρέθηκε.")
            .await?;
        if caller.actor.id == user.id {
            return Err(ApiError::Forbidden(
                "Δεν μπορείτε να διαγράψετε τον δικό σας λογαριασμό.".into(),
            ));
        }

        user.is_active = false;
        user.token_version += 1;
        self.collections.users.soft_delete(user).await?;

        self.audit
            .record(caller, "user.deleted", "user", id, json!({}))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_input_distinguishes_null_department() {
        let absent: UpdateUserInput = serde_json::from_str(r#"{"name":"A"}"#).unwrap();
        assert_eq!(absent.department_id, None);

        let cleared: UpdateUserInput = serde_json::from_str(r#"{"department_id":null}"#).unwrap();
        assert_eq!(cleared.department_id, Some(None));

        let set: UpdateUserInput = serde_json::from_str(r#"{"department_id":"d1"}"#).unwrap();
        assert_eq!(set.department_id, Some(Some("d1".to_string())));
    }

    #[test]
    fn test_view_hides_password_hash() {
        let user = UserDoc::new(
            "Maria".into(),
            "Maria@Example.org".into(),
            "$argon2id$secret".into(),
            Role::Volunteer,
        );
        let json = serde_json::to_value(UserView::from(&user)).unwrap();
        assert_eq!(json["email"], "maria@example.org");
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "VOLUNTEER");
    }
}
