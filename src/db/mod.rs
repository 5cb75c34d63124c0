//! Database layer for Muster
//!
//! Typed collections over a pluggable document store: MongoDB in production,
//! process memory in dev mode and tests.

pub mod collection;
pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use collection::{Collection, Record};
pub use memory::MemoryStore;
pub use mongo::MongoClient;
pub use store::DocumentStore;

use std::sync::Arc;

use schemas::{
    AuditLogDoc, DepartmentDoc, DocumentDoc, MissionDoc, NotificationDoc, ParticipationDoc,
    ShiftDoc, UserDoc,
};

use crate::types::Result;

/// Every collection the service uses, sharing one store
#[derive(Clone)]
pub struct Collections {
    pub store: Arc<dyn DocumentStore>,
    pub users: Collection<UserDoc>,
    pub departments: Collection<DepartmentDoc>,
    pub missions: Collection<MissionDoc>,
    pub shifts: Collection<ShiftDoc>,
    pub participations: Collection<ParticipationDoc>,
    pub documents: Collection<DocumentDoc>,
    pub notifications: Collection<NotificationDoc>,
    pub audit_logs: Collection<AuditLogDoc>,
}

impl Collections {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Collection::new(Arc::clone(&store)),
            departments: Collection::new(Arc::clone(&store)),
            missions: Collection::new(Arc::clone(&store)),
            shifts: Collection::new(Arc::clone(&store)),
            participations: Collection::new(Arc::clone(&store)),
            documents: Collection::new(Arc::clone(&store)),
            notifications: Collection::new(Arc::clone(&store)),
            audit_logs: Collection::new(Arc::clone(&store)),
            store,
        }
    }

    /// Apply every schema's indexes
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.users.ensure_indexes().await?;
        self.departments.ensure_indexes().await?;
        self.missions.ensure_indexes().await?;
        self.shifts.ensure_indexes().await?;
        self.participations.ensure_indexes().await?;
        self.documents.ensure_indexes().await?;
        self.notifications.ensure_indexes().await?;
        self.audit_logs.ensure_indexes().await?;
        Ok(())
    }
}
