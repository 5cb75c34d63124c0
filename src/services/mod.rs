//! Service layer for Muster
//!
//! Services encapsulate business logic between HTTP handlers and the typed
//! collections. Each service wraps collection access with:
//! - Input validation
//! - Authorization policies
//! - Audit logging
//! - Event emission for notifications
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (routes/*.rs)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Typed collections (db::Collection<T>)
//!     ↓
//! DocumentStore (MongoDB or memory)
//! ```

pub mod audit_service;
pub mod auth_service;
pub mod department_service;
pub mod document_service;
pub mod events;
pub mod mission_service;
pub mod notification_service;
pub mod pagination;
pub mod participation_service;
pub mod report_service;
pub mod shift_service;
pub mod user_service;

// Re-exports
pub use audit_service::{AuditFilter, AuditService};
pub use auth_service::AuthService;
pub use department_service::DepartmentService;
pub use document_service::DocumentService;
pub use events::{DomainEvent, EventBus};
pub use mission_service::MissionService;
pub use notification_service::NotificationService;
pub use pagination::{Page, PageMeta, PageRequest};
pub use participation_service::ParticipationService;
pub use report_service::ReportService;
pub use shift_service::ShiftService;
pub use user_service::{UserService, UserView};

use std::sync::Arc;

use crate::auth::{Actor, JwtValidator};
use crate::config::Args;
use crate::db::Collections;

/// Authenticated caller of a service operation
#[derive(Debug, Clone)]
pub struct Caller {
    pub actor: Actor,
    /// Client address, recorded in audit entries
    pub ip: Option<String>,
}

impl Caller {
    pub fn new(actor: Actor, ip: Option<String>) -> Self {
        Self { actor, ip }
    }
}

/// Service container for dependency injection
///
/// Holds all services with the shared collections and event bus.
pub struct Services {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub departments: Arc<DepartmentService>,
    pub missions: Arc<MissionService>,
    pub shifts: Arc<ShiftService>,
    pub participations: Arc<ParticipationService>,
    pub documents: Arc<DocumentService>,
    pub notifications: Arc<NotificationService>,
    pub audit: Arc<AuditService>,
    pub reports: Arc<ReportService>,
    pub events: Arc<EventBus>,
    pub collections: Collections,
}

impl Services {
    /// Create all services over shared collections
    pub fn new(collections: Collections, args: &Args, jwt: JwtValidator) -> Self {
        let events = Arc::new(EventBus::new());
        let audit = Arc::new(AuditService::new(collections.audit_logs.clone()));

        Self {
            auth: Arc::new(AuthService::new(
                collections.clone(),
                jwt,
                audit.clone(),
                events.clone(),
            )),
            users: Arc::new(UserService::new(collections.clone(), audit.clone())),
            departments: Arc::new(DepartmentService::new(collections.clone(), audit.clone())),
            missions: Arc::new(MissionService::new(
                collections.clone(),
                audit.clone(),
                events.clone(),
            )),
            shifts: Arc::new(ShiftService::new(
                collections.clone(),
                audit.clone(),
                events.clone(),
            )),
            participations: Arc::new(ParticipationService::new(
                collections.clone(),
                audit.clone(),
                events.clone(),
            )),
            documents: Arc::new(DocumentService::new(
                collections.clone(),
                audit.clone(),
                args.storage_dir.clone(),
                args.max_upload_bytes,
            )),
            notifications: Arc::new(NotificationService::new(collections.notifications.clone())),
            reports: Arc::new(ReportService::new(collections.clone())),
            audit,
            events,
            collections,
        }
    }
}

/// Run `op` again when it loses an optimistic-concurrency race, backing
/// off exponentially between attempts
pub(crate) async fn with_retry<T, F, Fut>(mut op: F) -> crate::types::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::types::Result<T>>,
{
    const MAX_ATTEMPTS: u32 = 5;
    const BASE_DELAY_MS: u64 = 5;

    let mut attempt = 1;
    loop {
        match op().await {
            Err(crate::types::ApiError::Conflict(msg)) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, "Write conflict, retrying: {}", msg);
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
