//! Auth service - registration, login and token lifecycle
//!
//! Every issued token embeds the user's `token_version`. Logout and password
//! changes bump the version, so tokens issued earlier stop verifying.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::auth::{
    check_new_password, hash_password, verify_password, verify_unknown_user, JwtValidator, Role,
    TokenInput, TokenKind, TokenPair, MIN_PASSWORD_LEN,
};
use crate::db::schemas::{normalize_email, UserDoc};
use crate::db::Collections;
use crate::types::{ApiError, Result, Validator};

use super::events::{DomainEvent, EventBus};
use super::{with_retry, AuditService, Caller, UserView};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

/// Successful authentication: the user plus a fresh token pair
#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub user: UserView,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

pub struct AuthService {
    collections: Collections,
    jwt: JwtValidator,
    audit: Arc<AuditService>,
    events: Arc<EventBus>,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Τα στοιχεία σύνδεσης δεν είναι σωστά.".into())
}

fn invalid_session() -> ApiError {
    ApiError::Unauthorized("Η συνεδρία δεν είναι πλέον έγκυρη. Συνδεθείτε ξανά.".into())
}

impl AuthService {
    pub fn new(
        collections: Collections,
        jwt: JwtValidator,
        audit: Arc<AuditService>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            collections,
            jwt,
            audit,
            events,
        }
    }

    fn issue(&self, user: &UserDoc) -> Result<AuthResult> {
        let tokens = self.jwt.generate_pair(&TokenInput {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            token_version: user.token_version,
        })?;
        Ok(AuthResult {
            user: UserView::from(user),
            tokens,
        })
    }

    async fn email_taken(&self, email: &str, except_id: Option<&str>) -> Result<bool> {
        Ok(self
            .collections
            .users
            .find_with_deleted(bson::doc! { "email": normalize_email(email) })
            .await?
            .iter()
            .any(|u| Some(u.id.as_str()) != except_id))
    }

    /// Re-read the user and apply `change`, retrying on write conflicts
    async fn modify_user(&self, id: &str, change: impl Fn(&mut UserDoc)) -> Result<UserDoc> {
        let users = &self.collections.users;
        let change = &change;
        with_retry(move || async move {
            let mut user = users.get(id).await?.ok_or_else(invalid_session)?;
            change(&mut user);
            users.update(user).await
        })
        .await
    }

    /// Resolve a bearer access token to its user
    pub async fn authenticate(&self, token: &str) -> Result<UserDoc> {
        let claims = self.jwt.verify(token, TokenKind::Access)?;
        self.user_for_claims(&claims.sub, claims.token_version).await
    }

    async fn user_for_claims(&self, user_id: &str, token_version: i32) -> Result<UserDoc> {
        let user = self
            .collections
            .users
            .get(user_id)
            .await?
            .ok_or_else(invalid_session)?;

        if user.token_version != token_version {
            return Err(invalid_session());
        }
        if !user.is_active {
            return Err(ApiError::Forbidden(
                "Ο λογαριασμός σας είναι απενεργοποιημένος.".into(),
            ));
        }
        Ok(user)
    }

    pub async fn register(&self, input: RegisterInput, ip: Option<String>) -> Result<AuthResult> {
        let mut v = Validator::new();
        v.required("name", input.name.as_deref())
            .max_len("name", input.name.as_deref(), 255)
            .required("email", input.email.as_deref())
            .email("email", input.email.as_deref())
            .max_len("email", input.email.as_deref(), 255)
            .max_len("phone", input.phone.as_deref(), 32);
        check_new_password(
            &mut v,
            "password",
            input.password.as_deref(),
            Some(input.password_confirmation.as_deref()),
        );
        v.finish()?;

        let (Some(name), Some(email), Some(password)) = (input.name, input.email, input.password)
        else {
            return Err(ApiError::BadRequest("Λείπουν υποχρεωτικά πεδία.".into()));
        };

        if self.email_taken(&email, None).await? {
            return Err(ApiError::invalid_field("email", "Το email χρησιμοποιείται ήδη."));
        }

        let mut user = UserDoc::new(
            name.trim().to_string(),
            email,
            hash_password(&password)?,
            Role::Volunteer,
        );
        user.phone = input.phone.filter(|p| !p.trim().is_empty());
        let user = self.collections.users.insert(user).await?;

        info!(user_id = %user.id, "User registered");
        self.audit
            .append(
                Some(user.id.clone()),
                ip,
                "auth.registered",
                "user",
                &user.id,
                json!({ "email": user.email }),
            )
            .await;
        self.events.emit(DomainEvent::UserRegistered {
            user_id: user.id.clone(),
        });

        self.issue(&user)
    }

    pub async fn login(&self, input: LoginInput, ip: Option<String>) -> Result<AuthResult> {
        let mut v = Validator::new();
        v.required("email", input.email.as_deref())
            .required("password", input.password.as_deref());
        v.finish()?;

        let email = normalize_email(input.email.as_deref().unwrap_or_default());
        let password = input.password.unwrap_or_default();

        let Some(user) = self
            .collections
            .users
            .find(bson::doc! { "email": email.as_str() })
            .await?
            .into_iter()
            .next()
        else {
            verify_unknown_user(&password);
            return Err(invalid_credentials());
        };

        if !verify_password(&password, &user.password_hash)? {
            self.audit
                .append(
                    Some(user.id.clone()),
                    ip,
                    "auth.login_failed",
                    "user",
                    &user.id,
                    json!({}),
                )
                .await;
            return Err(invalid_credentials());
        }

        if !user.is_active {
            return Err(ApiError::Forbidden(
                "Ο λογαριασμός σας είναι απενεργοποιημένος.".into(),
            ));
        }

        let user = self
            .modify_user(&user.id, |u| u.last_login_at = Some(Utc::now()))
            .await?;

        self.audit
            .append(Some(user.id.clone()), ip, "auth.login", "user", &user.id, json!({}))
            .await;

        self.issue(&user)
    }

    /// Invalidate every token of the caller
    pub async fn logout(&self, caller: &Caller) -> Result<()> {
        self.modify_user(&caller.actor.id, |u| u.token_version += 1)
            .await?;
        self.audit
            .record(caller, "auth.logout", "user", &caller.actor.id, json!({}))
            .await;
        Ok(())
    }

    pub async fn me(&self, caller: &Caller) -> Result<UserView> {
        let user = self
            .collections
            .users
            .get(&caller.actor.id)
            .await?
            .ok_or_else(invalid_session)?;
        Ok(UserView::from(&user))
    }

    pub async fn update_profile(&self, caller: &Caller, input: ProfileInput) -> Result<UserView> {
        let mut v = Validator::new();
        v.max_len("name", input.name.as_deref(), 255)
            .check(
                input.name.as_deref().map_or(true, |n| !n.trim().is_empty()),
                "name",
                "Το πεδίο name δεν μπορεί να είναι κενό.",
            )
            .email("email", input.email.as_deref())
            .check(
                input.email.as_deref().map_or(true, |e| !e.trim().is_empty()),
                "email",
                "Το πεδίο email δεν μπορεί να είναι κενό.",
            )
            .max_len("phone", input.phone.as_deref(), 32);
        v.finish()?;

        if let Some(ref email) = input.email {
            if self.email_taken(email, Some(&caller.actor.id)).await? {
                return Err(ApiError::invalid_field("email", "Το email χρησιμοποιείται ήδη."));
            }
        }

        let user = self
            .modify_user(&caller.actor.id, |u| {
                if let Some(ref name) = input.name {
                    u.name = name.trim().to_string();
                }
                if let Some(ref email) = input.email {
                    u.email = normalize_email(email);
                }
                if let Some(ref phone) = input.phone {
                    u.phone = Some(phone.clone()).filter(|p| !p.trim().is_empty());
                }
            })
            .await?;

        self.audit
            .record(
                caller,
                "auth.profile_updated",
                "user",
                &user.id,
                json!({ "name": input.name, "email": input.email, "phone": input.phone }),
            )
            .await;

        Ok(UserView::from(&user))
    }

    /// Change the caller's password and hand back a fresh token pair
    pub async fn change_password(
        &self,
        caller: &Caller,
        input: ChangePasswordInput,
    ) -> Result<AuthResult> {
        let mut v = Validator::new();
        v.required("current_password", input.current_password.as_deref());
        check_new_password(
            &mut v,
            "password",
            input.password.as_deref(),
            Some(input.password_confirmation.as_deref()),
        );
        v.finish()?;

        let user = self
            .collections
            .users
            .get(&caller.actor.id)
            .await?
            .ok_or_else(invalid_session)?;

        let current = input.current_password.unwrap_or_default();
        if !verify_password(&current, &user.password_hash)? {
            return Err(ApiError::invalid_field(
                "current_password",
                "Ο τρέχων κωδικός δεν είναι σωστός.",
            ));
        }

        let new_hash = hash_password(&input.password.unwrap_or_default())?;
        let user = self
            .modify_user(&user.id, |u| {
                u.password_hash = new_hash.clone();
                u.token_version += 1;
            })
            .await?;

        self.audit
            .record(caller, "auth.password_changed", "user", &user.id, json!({}))
            .await;
        self.events.emit(DomainEvent::PasswordChanged {
            user_id: user.id.clone(),
        });

        self.issue(&user)
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh(&self, input: RefreshInput) -> Result<AuthResult> {
        let mut v = Validator::new();
        v.required("refresh_token", input.refresh_token.as_deref());
        v.finish()?;

        let claims = self
            .jwt
            .verify(input.refresh_token.as_deref().unwrap_or_default(), TokenKind::Refresh)?;
        let user = self.user_for_claims(&claims.sub, claims.token_version).await?;
        self.issue(&user)
    }

    /// Create the configured system administrator when no user owns the email.
    ///
    /// Returns whether a user was created.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<bool> {
        if self.email_taken(email, None).await? {
            return Ok(false);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Config(format!(
                "BOOTSTRAP_ADMIN_PASSWORD must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let user = UserDoc::new(
            "Administrator".to_string(),
            email.to_string(),
            hash_password(password)?,
            Role::SystemAdmin,
        );
        let user = self.collections.users.insert(user).await?;

        info!(email = %user.email, "Bootstrap administrator created");
        self.audit
            .append(None, None, "user.bootstrapped", "user", &user.id, json!({ "email": user.email }))
            .await;
        Ok(true)
    }
}
