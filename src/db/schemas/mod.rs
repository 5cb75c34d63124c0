//! Database schemas for Muster
//!
//! Document structures for every stored entity.

mod audit_log;
mod department;
mod document;
mod metadata;
mod mission;
mod notification;
mod participation;
mod shift;
mod user;

pub use audit_log::{AuditLogDoc, AUDIT_LOG_COLLECTION};
pub use department::{DepartmentDoc, DEPARTMENT_COLLECTION};
pub use document::{DocumentDoc, Visibility, DOCUMENT_COLLECTION};
pub use metadata::Metadata;
pub use mission::{MissionDoc, MissionStatus, MISSION_COLLECTION};
pub use notification::{NotificationDoc, NOTIFICATION_COLLECTION};
pub use participation::{ParticipationDoc, ParticipationStatus, PARTICIPATION_COLLECTION};
pub use shift::{CapacityError, ShiftDoc, ShiftStatus, SHIFT_COLLECTION};
pub use user::{normalize_email, UserDoc, USER_COLLECTION};
