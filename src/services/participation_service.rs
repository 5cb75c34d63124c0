//! Participation service - volunteers applying for shifts
//!
//! Request lifecycle:
//!
//! ```text
//! PENDING ──approve──> APPROVED ──cancel──> CANCELED_BY_USER | CANCELED_BY_ADMIN
//!    │                                 ▲
//!    ├──reject──> REJECTED             │
//!    └──cancel─────────────────────────┘
//! ```
//!
//! Approving takes a place on the shift and canceling an approved request
//! gives it back. Both re-read the shift and write it with a version check,
//! retrying when a concurrent writer got there first, so `current_count`
//! never passes `max_capacity`.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::auth::permissions::can_lead_shift;
use crate::auth::Role;
use crate::db::schemas::{
    CapacityError, MissionDoc, MissionStatus, ParticipationDoc, ParticipationStatus, ShiftDoc,
    ShiftStatus,
};
use crate::db::{Collection, Collections};
use crate::types::{ApiError, Result, Validator};

use super::events::{DomainEvent, EventBus};
use super::pagination::{Page, PageRequest};
use super::{with_retry, AuditService, Caller};

/// Number of stripes serializing applications
const APPLY_STRIPES: usize = 64;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ApplyInput {
    pub shift_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DecisionInput {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ParticipationFilter {
    pub shift_id: Option<String>,
    pub mission_id: Option<String>,
    pub status: Option<ParticipationStatus>,
    pub volunteer_id: Option<String>,
}

pub struct ParticipationService {
    collections: Collections,
    audit: Arc<AuditService>,
    events: Arc<EventBus>,
    /// One apply at a time per (shift, volunteer) stripe
    apply_locks: Vec<Mutex<()>>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Το αίτημα συμμετοχής δεν βρέθηκε.".into())
}

fn forbidden() -> ApiError {
    ApiError::Forbidden("Δεν έχετε δικαίωμα για αυτό το αίτημα συμμετοχής.".into())
}

fn capacity_error(err: CapacityError) -> ApiError {
    let message = match err {
        CapacityError::Full => "Η βάρδια είναι πλήρης.".to_string(),
        CapacityError::Closed(ShiftStatus::Locked) => "Η βάρδια είναι κλειδωμένη.".to_string(),
        CapacityError::Closed(status) => format!("Η βάρδια δεν δέχεται εγκρίσεις ({}).", status),
        CapacityError::Empty => "Η βάρδια δεν έχει κατειλημμένες θέσεις.".to_string(),
    };
    ApiError::invalid_field("shift_id", message)
}

/// Take one place on the shift, re-reading it on every attempt
pub(crate) async fn occupy_slot(shifts: &Collection<ShiftDoc>, shift_id: &str) -> Result<ShiftDoc> {
    with_retry(move || async move {
        let mut shift = shifts.get(shift_id).await?.ok_or_else(|| {
            ApiError::NotFound("Η βάρδια δεν βρέθηκε.".into())
        })?;
        shift.occupy().map_err(capacity_error)?;
        shifts.update(shift).await
    })
    .await
}

/// Give one place back; deleted and canceled shifts still get their counter fixed
pub(crate) async fn release_slot(shifts: &Collection<ShiftDoc>, shift_id: &str) -> Result<()> {
    with_retry(move || async move {
        let Some(mut shift) = shifts.get_with_deleted(shift_id).await? else {
            return Ok(());
        };
        match shift.release() {
            Ok(()) => shifts.update(shift).await.map(|_| ()),
            Err(_) => {
                warn!(shift_id, "Release on a shift with no occupied places");
                Ok(())
            }
        }
    })
    .await
}

/// Set `current_count` to the number of APPROVED requests of the shift.
/// Approvals still between taking their place and writing the request are
/// not counted.
pub(crate) async fn recount_slots(collections: &Collections, shift_id: &str) -> Result<()> {
    let shifts = &collections.shifts;
    let requests = &collections.participations;
    with_retry(move || async move {
        let Some(mut shift) = shifts.get_with_deleted(shift_id).await? else {
            return Ok(());
        };
        let approved = requests
            .find(bson::doc! { "shift_id": shift_id, "status": ParticipationStatus::Approved.as_str() })
            .await?
            .len() as i32;
        if shift.current_count == approved {
            return Ok(());
        }
        info!(shift_id, from = shift.current_count, to = approved, "Recounted shift places");
        shift.current_count = approved;
        shift.recompute_status();
        shifts.update(shift).await.map(|_| ())
    })
    .await
}

/// Give back the place of a request that no longer holds it. The request
/// write has already happened, so failures here are logged and the counter
/// is recounted instead of failing the caller.
pub(crate) async fn give_back_slot(collections: &Collections, shift_id: &str) {
    let Err(e) = release_slot(&collections.shifts, shift_id).await else {
        return;
    };
    warn!(shift_id, "Release failed, recounting approved requests: {}", e);
    if let Err(e) = recount_slots(collections, shift_id).await {
        error!(shift_id, "Shift counter could not be reconciled: {}", e);
    }
}

/// Move an active request to CANCELED_BY_ADMIN, giving back its place.
/// `None` when the request is gone or already final.
pub(crate) async fn cancel_by_admin(
    collections: &Collections,
    request_id: &str,
    decided_by: &str,
    reason: Option<String>,
) -> Result<Option<ParticipationDoc>> {
    let requests = &collections.participations;
    let reason = &reason;
    let updated = with_retry(move || async move {
        let Some(mut request) = requests.get(request_id).await? else {
            return Ok(None);
        };
        if !request.status.is_active() {
            return Ok(None);
        }
        let was_approved = request.status == ParticipationStatus::Approved;
        request.status = ParticipationStatus::CanceledByAdmin;
        request.canceled_at = Some(Utc::now());
        request.cancel_reason = reason.clone();
        request.decided_by = Some(decided_by.to_string());
        requests
            .update(request)
            .await
            .map(|r| Some((r, was_approved)))
    })
    .await?;

    let Some((request, was_approved)) = updated else {
        return Ok(None);
    };
    if was_approved {
        give_back_slot(collections, &request.shift_id).await;
    }
    Ok(Some(request))
}

impl ParticipationService {
    pub fn new(collections: Collections, audit: Arc<AuditService>, events: Arc<EventBus>) -> Self {
        Self {
            collections,
            audit,
            events,
            apply_locks: (0..APPLY_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn apply_lock(&self, shift_id: &str, volunteer_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        (shift_id, volunteer_id).hash(&mut hasher);
        &self.apply_locks[(hasher.finish() as usize) % self.apply_locks.len()]
    }

    async fn shift_and_mission(&self, shift_id: &str) -> Result<(ShiftDoc, MissionDoc)> {
        let shift = self
            .collections
            .shifts
            .get_with_deleted(shift_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Η βάρδια δεν βρέθηκε.".into()))?;
        let mission = self
            .collections
            .missions
            .get_with_deleted(&shift.mission_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Η αποστολή δεν βρέθηκε.".into()))?;
        Ok((shift, mission))
    }

    /// Load a request together with its shift and mission
    async fn load(&self, id: &str) -> Result<(ParticipationDoc, ShiftDoc, MissionDoc)> {
        let request = self
            .collections
            .participations
            .get(id)
            .await?
            .ok_or_else(not_found)?;
        let (shift, mission) = self.shift_and_mission(&request.shift_id).await?;
        Ok((request, shift, mission))
    }

    fn require_pending(request: &ParticipationDoc) -> Result<()> {
        if request.status != ParticipationStatus::Pending {
            return Err(ApiError::invalid_field(
                "status",
                format!(
                    "Μόνο εκκρεμή αιτήματα μπορούν να κριθούν (τρέχουσα κατάσταση {}).",
                    request.status
                ),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub async fn get(&self, caller: &Caller, id: &str) -> Result<ParticipationDoc> {
        let (request, shift, mission) = self.load(id).await?;
        if request.volunteer_id != caller.actor.id && !can_lead_shift(&caller.actor, &shift, &mission) {
            return Err(forbidden());
        }
        Ok(request)
    }

    /// Volunteers see their own requests; leaders and admins also see the
    /// requests of shifts they lead or manage. Newest first.
    pub async fn list(
        &self,
        caller: &Caller,
        filter: &ParticipationFilter,
        page: PageRequest,
    ) -> Result<Page<ParticipationDoc>> {
        let actor = &caller.actor;

        let mut query = bson::Document::new();
        if let Some(ref shift_id) = filter.shift_id {
            query.insert("shift_id", shift_id.as_str());
        }
        if let Some(ref mission_id) = filter.mission_id {
            query.insert("mission_id", mission_id.as_str());
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if actor.role == Role::Volunteer {
            query.insert("volunteer_id", actor.id.as_str());
        } else if let Some(ref volunteer_id) = filter.volunteer_id {
            query.insert("volunteer_id", volunteer_id.as_str());
        }

        let candidates = self.collections.participations.find(query).await?;

        let mut visible = Vec::with_capacity(candidates.len());
        if actor.is_system_admin() {
            visible.extend(candidates);
        } else {
            // Decide visibility once per shift
            let mut allowed: HashMap<String, bool> = HashMap::new();
            for request in candidates {
                if request.volunteer_id == actor.id {
                    visible.push(request);
                    continue;
                }
                let can_see = match allowed.get(&request.shift_id) {
                    Some(&can_see) => can_see,
                    None => {
                        let can_see = match self.shift_and_mission(&request.shift_id).await {
                            Ok((shift, mission)) => can_lead_shift(actor, &shift, &mission),
                            Err(ApiError::NotFound(_)) => false,
                            Err(e) => return Err(e),
                        };
                        allowed.insert(request.shift_id.clone(), can_see);
                        can_see
                    }
                };
                if can_see {
                    visible.push(request);
                }
            }
        }

        visible.sort_by(|a, b| b.metadata.created().cmp(&a.metadata.created()));
        Ok(Page::from_vec(visible, page))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub async fn apply(&self, caller: &Caller, input: ApplyInput) -> Result<ParticipationDoc> {
        let mut v = Validator::new();
        v.required("shift_id", input.shift_id.as_deref())
            .max_len("notes", input.notes.as_deref(), 1000);
        v.finish()?;
        let shift_id = input.shift_id.unwrap_or_default();

        let shift = self
            .collections
            .shifts
            .get(&shift_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Η βάρδια δεν βρέθηκε.".into()))?;
        let mission = self
            .collections
            .missions
            .get(&shift.mission_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Η αποστολή δεν βρέθηκε.".into()))?;

        if mission.status != MissionStatus::Published {
            return Err(ApiError::invalid_field(
                "shift_id",
                "Η αποστολή δεν δέχεται αιτήματα συμμετοχής.",
            ));
        }
        if shift.status != ShiftStatus::Open {
            return Err(ApiError::invalid_field(
                "shift_id",
                format!("Η βάρδια δεν δέχεται αιτήματα ({}).", shift.status),
            ));
        }
        if shift.start_at <= Utc::now() {
            return Err(ApiError::invalid_field("shift_id", "Η βάρδια έχει ήδη ξεκινήσει."));
        }

        let _guard = self.apply_lock(&shift.id, &caller.actor.id).lock().await;

        let duplicate = self
            .collections
            .participations
            .find(bson::doc! { "shift_id": shift.id.as_str(), "volunteer_id": caller.actor.id.as_str() })
            .await?
            .into_iter()
            .any(|r| r.status.is_active());
        if duplicate {
            return Err(ApiError::invalid_field(
                "shift_id",
                "Έχετε ήδη ενεργό αίτημα για αυτή τη βάρδια.",
            ));
        }

        let request = ParticipationDoc {
            id: uuid::Uuid::new_v4().to_string(),
            shift_id: shift.id.clone(),
            mission_id: mission.id.clone(),
            volunteer_id: caller.actor.id.clone(),
            status: ParticipationStatus::Pending,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            ..Default::default()
        };
        let request = self.collections.participations.insert(request).await?;

        self.audit
            .record(
                caller,
                "participation.requested",
                "participation_request",
                &request.id,
                json!({ "shift_id": request.shift_id }),
            )
            .await;
        self.events.emit(DomainEvent::ParticipationRequested {
            request_id: request.id.clone(),
            shift_id: request.shift_id.clone(),
            mission_id: request.mission_id.clone(),
            volunteer_id: request.volunteer_id.clone(),
        });

        Ok(request)
    }

    pub async fn approve(&self, caller: &Caller, id: &str) -> Result<ParticipationDoc> {
        let (request, shift, mission) = self.load(id).await?;
        if !can_lead_shift(&caller.actor, &shift, &mission) {
            return Err(forbidden());
        }
        Self::require_pending(&request)?;
        if !mission.status.is_editable() {
            return Err(ApiError::invalid_field(
                "status",
                "Η αποστολή δεν δέχεται εγκρίσεις.",
            ));
        }

        // Place first, then the request; undo the place if the request moved on
        let shift = occupy_slot(&self.collections.shifts, &request.shift_id).await?;

        let mut approved = request;
        approved.status = ParticipationStatus::Approved;
        approved.decided_by = Some(caller.actor.id.clone());
        approved.decided_at = Some(Utc::now());
        let approved = match self.collections.participations.update(approved).await {
            Ok(approved) => approved,
            Err(e) => {
                give_back_slot(&self.collections, &shift.id).await;
                return Err(e);
            }
        };

        info!(
            request_id = %approved.id,
            shift_id = %shift.id,
            count = shift.current_count,
            capacity = shift.max_capacity,
            "Participation approved"
        );
        self.audit
            .record(
                caller,
                "participation.approved",
                "participation_request",
                &approved.id,
                json!({ "shift_id": shift.id, "current_count": shift.current_count }),
            )
            .await;
        self.events.emit(DomainEvent::ParticipationApproved {
            request_id: approved.id.clone(),
            shift_id: approved.shift_id.clone(),
            mission_id: approved.mission_id.clone(),
            volunteer_id: approved.volunteer_id.clone(),
        });

        Ok(approved)
    }

    pub async fn reject(&self, caller: &Caller, id: &str, input: DecisionInput) -> Result<ParticipationDoc> {
        let mut v = Validator::new();
        v.max_len("reason", input.reason.as_deref(), 1000);
        v.finish()?;

        let (mut request, shift, mission) = self.load(id).await?;
        if !can_lead_shift(&caller.actor, &shift, &mission) {
            return Err(forbidden());
        }
        Self::require_pending(&request)?;

        let reason = input.reason.filter(|r| !r.trim().is_empty());
        request.status = ParticipationStatus::Rejected;
        request.rejection_reason = reason.clone();
        request.decided_by = Some(caller.actor.id.clone());
        request.decided_at = Some(Utc::now());
        let request = self.collections.participations.update(request).await?;

        self.audit
            .record(
                caller,
                "participation.rejected",
                "participation_request",
                &request.id,
                json!({ "reason": reason }),
            )
            .await;
        self.events.emit(DomainEvent::ParticipationRejected {
            request_id: request.id.clone(),
            shift_id: request.shift_id.clone(),
            mission_id: request.mission_id.clone(),
            volunteer_id: request.volunteer_id.clone(),
            reason,
        });

        Ok(request)
    }

    /// Owners cancel their own requests; leaders and managers cancel any
    pub async fn cancel(&self, caller: &Caller, id: &str, input: DecisionInput) -> Result<ParticipationDoc> {
        let mut v = Validator::new();
        v.max_len("reason", input.reason.as_deref(), 1000);
        v.finish()?;

        let (mut request, shift, mission) = self.load(id).await?;
        let by_owner = request.volunteer_id == caller.actor.id;
        if !by_owner && !can_lead_shift(&caller.actor, &shift, &mission) {
            return Err(forbidden());
        }
        if !request.status.is_active() {
            return Err(ApiError::invalid_field(
                "status",
                format!("Το αίτημα δεν μπορεί να ακυρωθεί (κατάσταση {}).", request.status),
            ));
        }

        let was_approved = request.status == ParticipationStatus::Approved;
        let reason = input.reason.filter(|r| !r.trim().is_empty());
        request.status = if by_owner {
            ParticipationStatus::CanceledByUser
        } else {
            ParticipationStatus::CanceledByAdmin
        };
        request.canceled_at = Some(Utc::now());
        request.cancel_reason = reason.clone();
        if !by_owner {
            request.decided_by = Some(caller.actor.id.clone());
        }
        let request = self.collections.participations.update(request).await?;

        if was_approved {
            give_back_slot(&self.collections, &request.shift_id).await;
        }

        self.audit
            .record(
                caller,
                "participation.canceled",
                "participation_request",
                &request.id,
                json!({ "status": request.status, "was_approved": was_approved, "reason": reason }),
            )
            .await;
        self.events.emit(DomainEvent::ParticipationCanceled {
            request_id: request.id.clone(),
            shift_id: request.shift_id.clone(),
            mission_id: request.mission_id.clone(),
            volunteer_id: request.volunteer_id.clone(),
            by_admin: !by_owner,
            reason,
        });

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::Duration;

    async fn seeded(max_capacity: i32, current_count: i32) -> (Collections, ShiftDoc) {
        let collections = Collections::new(Arc::new(MemoryStore::new()));
        let start_at = Utc::now() + Duration::days(1);
        let mut shift = ShiftDoc {
            id: "shift-1".into(),
            mission_id: "mission-1".into(),
            start_at,
            end_at: start_at + Duration::hours(4),
            max_capacity,
            current_count,
            ..Default::default()
        };
        shift.recompute_status();
        let shift = collections.shifts.insert(shift).await.unwrap();
        (collections, shift)
    }

    async fn request(collections: &Collections, volunteer: &str, status: ParticipationStatus) {
        collections
            .participations
            .insert(ParticipationDoc {
                id: uuid::Uuid::new_v4().to_string(),
                shift_id: "shift-1".into(),
                mission_id: "mission-1".into(),
                volunteer_id: volunteer.into(),
                status,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recount_lowers_inflated_counter() {
        let (collections, shift) = seeded(2, 2).await;
        assert_eq!(shift.status, ShiftStatus::Full);
        request(&collections, "v1", ParticipationStatus::Approved).await;
        request(&collections, "v2", ParticipationStatus::CanceledByUser).await;

        recount_slots(&collections, "shift-1").await.unwrap();

        let shift = collections.shifts.get("shift-1").await.unwrap().unwrap();
        assert_eq!(shift.current_count, 1);
        assert_eq!(shift.status, ShiftStatus::Open);
    }

    #[tokio::test]
    async fn test_recount_keeps_sticky_status() {
        let (collections, mut shift) = seeded(3, 2).await;
        shift.status = ShiftStatus::Locked;
        collections.shifts.update(shift).await.unwrap();

        recount_slots(&collections, "shift-1").await.unwrap();

        let shift = collections.shifts.get("shift-1").await.unwrap().unwrap();
        assert_eq!(shift.current_count, 0);
        assert_eq!(shift.status, ShiftStatus::Locked);
    }

    #[tokio::test]
    async fn test_give_back_slot_releases_one_place() {
        let (collections, _) = seeded(1, 1).await;
        request(&collections, "v1", ParticipationStatus::Approved).await;

        give_back_slot(&collections, "shift-1").await;

        let shift = collections.shifts.get("shift-1").await.unwrap().unwrap();
        assert_eq!(shift.current_count, 0);
        assert_eq!(shift.status, ShiftStatus::Open);
    }

    #[tokio::test]
    async fn test_cancel_by_admin_skips_final_requests() {
        let (collections, _) = seeded(2, 1).await;
        collections
            .participations
            .insert(ParticipationDoc {
                id: "approved".into(),
                shift_id: "shift-1".into(),
                mission_id: "mission-1".into(),
                volunteer_id: "v1".into(),
                status: ParticipationStatus::Approved,
                ..Default::default()
            })
            .await
            .unwrap();

        let canceled = cancel_by_admin(&collections, "approved", "admin", Some("Κακοκαιρία".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(canceled.status, ParticipationStatus::CanceledByAdmin);
        assert_eq!(canceled.decided_by.as_deref(), Some("admin"));
        let shift = collections.shifts.get("shift-1").await.unwrap().unwrap();
        assert_eq!(shift.current_count, 0);

        // Second pass finds nothing to do
        assert!(cancel_by_admin(&collections, "approved", "admin", None)
            .await
            .unwrap()
            .is_none());
    }
}
