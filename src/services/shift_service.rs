//! Shift service - time slots inside a mission
//!
//! Capacity changes made here (editing `max_capacity`, locking) go through
//! the same versioned writes as approvals, so they never interleave with a
//! concurrent approval unnoticed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::auth::permissions::{can_lead_shift, can_manage_mission, can_view_mission};
use crate::db::schemas::{MissionDoc, ParticipationStatus, ShiftDoc, ShiftStatus};
use crate::db::Collections;
use crate::types::{ApiError, Result, Validator};

use super::events::{DomainEvent, EventBus};
use super::participation_service::cancel_by_admin;
use super::{AuditService, Caller, UserView};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ShiftInput {
    pub title: Option<String>,
    pub leader_id: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub max_capacity: Option<i64>,
    pub notes: Option<String>,
}

/// An approved participant of a shift
#[derive(Debug, Clone, Serialize)]
pub struct ShiftVolunteer {
    pub request_id: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub user: UserView,
}

pub struct ShiftService {
    collections: Collections,
    audit: Arc<AuditService>,
    events: Arc<EventBus>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Η βάρδια δεν βρέθηκε.".into())
}

fn forbidden() -> ApiError {
    ApiError::Forbidden("Δεν έχετε δικαίωμα διαχείρισης αυτής της βάρδιας.".into())
}

impl ShiftService {
    pub fn new(collections: Collections, audit: Arc<AuditService>, events: Arc<EventBus>) -> Self {
        Self {
            collections,
            audit,
            events,
        }
    }

    /// Shift plus its mission, both visible to the caller
    pub async fn load(&self, caller: &Caller, id: &str) -> Result<(ShiftDoc, MissionDoc)> {
        let shift = self.collections.shifts.get(id).await?.ok_or_else(not_found)?;
        let mission = self
            .collections
            .missions
            .get_with_deleted(&shift.mission_id)
            .await?
            .ok_or_else(not_found)?;
        if !can_view_mission(&caller.actor, &mission) {
            return Err(not_found());
        }
        Ok((shift, mission))
    }

    async fn load_managed(&self, caller: &Caller, id: &str) -> Result<(ShiftDoc, MissionDoc)> {
        let (shift, mission) = self.load(caller, id).await?;
        if !can_manage_mission(&caller.actor, &mission) {
            return Err(forbidden());
        }
        Ok((shift, mission))
    }

    async fn mission_for(&self, caller: &Caller, mission_id: &str) -> Result<MissionDoc> {
        let mission = self
            .collections
            .missions
            .get(mission_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Η αποστολή δεν βρέθηκε.".into()))?;
        if !can_view_mission(&caller.actor, &mission) {
            return Err(ApiError::NotFound("Η αποστολή δεν βρέθηκε.".into()));
        }
        Ok(mission)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Shifts of a mission in chronological order
    pub async fn list(&self, caller: &Caller, mission_id: &str) -> Result<Vec<ShiftDoc>> {
        self.mission_for(caller, mission_id).await?;
        let mut shifts = self
            .collections
            .shifts
            .find(bson::doc! { "mission_id": mission_id })
            .await?;
        shifts.sort_by(|a, b| a.start_at.cmp(&b.start_at));
        Ok(shifts)
    }

    pub async fn get(&self, caller: &Caller, id: &str) -> Result<ShiftDoc> {
        self.load(caller, id).await.map(|(shift, _)| shift)
    }

    /// Approved participants with their user summaries
    pub async fn volunteers(&self, caller: &Caller, id: &str) -> Result<Vec<ShiftVolunteer>> {
        let (shift, mission) = self.load(caller, id).await?;
        if !can_lead_shift(&caller.actor, &shift, &mission) {
            return Err(forbidden());
        }

        let approved = self
            .collections
            .participations
            .find(bson::doc! { "shift_id": id, "status": ParticipationStatus::Approved.as_str() })
            .await?;

        let mut volunteers = Vec::with_capacity(approved.len());
        for request in approved {
            if let Some(user) = self
                .collections
                .users
                .get_with_deleted(&request.volunteer_id)
                .await?
            {
                volunteers.push(ShiftVolunteer {
                    request_id: request.id,
                    approved_at: request.decided_at,
                    notes: request.notes,
                    user: UserView::from(&user),
                });
            }
        }
        volunteers.sort_by(|a, b| a.user.name.to_lowercase().cmp(&b.user.name.to_lowercase()));
        Ok(volunteers)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    fn validate(input: &ShiftInput, creating: bool) -> Result<()> {
        let mut v = Validator::new();
        if creating {
            v.check(input.start_at.is_some(), "start_at", "Το πεδίο start_at είναι υποχρεωτικό.")
                .check(input.end_at.is_some(), "end_at", "Το πεδίο end_at είναι υποχρεωτικό.")
                .check(
                    input.max_capacity.is_some(),
                    "max_capacity",
                    "Το πεδίο max_capacity είναι υποχρεωτικό.",
                );
        }
        v.min_value("max_capacity", input.max_capacity, 1)
            .check(
                input.max_capacity.map_or(true, |c| c <= i64::from(i32::MAX)),
                "max_capacity",
                "Το πεδίο max_capacity είναι πολύ μεγάλο.",
            )
            .max_len("title", input.title.as_deref(), 255)
            .max_len("notes", input.notes.as_deref(), 2000);
        v.finish()
    }

    fn check_times(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        if end <= start {
            return Err(ApiError::invalid_field(
                "end_at",
                "Η λήξη της βάρδιας πρέπει να είναι μετά την έναρξη.",
            ));
        }
        Ok(())
    }

    async fn require_leader(&self, leader_id: &str) -> Result<()> {
        match self.collections.users.get(leader_id).await? {
            Some(user) if user.is_active => Ok(()),
            _ => Err(ApiError::invalid_field(
                "leader_id",
                "Ο υπεύθυνος βάρδιας δεν υπάρχει ή είναι ανενεργός.",
            )),
        }
    }

    fn require_editable(mission: &MissionDoc) -> Result<()> {
        if !mission.status.is_editable() {
            return Err(ApiError::invalid_field(
                "mission_id",
                "Η αποστολή δεν δέχεται αλλαγές στις βάρδιες.",
            ));
        }
        Ok(())
    }

    pub async fn create(&self, caller: &Caller, mission_id: &str, input: ShiftInput) -> Result<ShiftDoc> {
        let mission = self.mission_for(caller, mission_id).await?;
        if !can_manage_mission(&caller.actor, &mission) {
            return Err(forbidden());
        }
        Self::require_editable(&mission)?;
        Self::validate(&input, true)?;

        let (Some(start_at), Some(end_at), Some(max_capacity)) =
            (input.start_at, input.end_at, input.max_capacity)
        else {
            return Err(ApiError::BadRequest("Λείπουν υποχρεωτικά πεδία.".into()));
        };
        Self::check_times(start_at, end_at)?;
        if let Some(ref leader) = input.leader_id {
            self.require_leader(leader).await?;
        }

        let mut shift = ShiftDoc {
            id: uuid::Uuid::new_v4().to_string(),
            mission_id: mission.id.clone(),
            title: input.title,
            leader_id: input.leader_id,
            start_at,
            end_at,
            max_capacity: max_capacity as i32,
            current_count: 0,
            status: ShiftStatus::Open,
            notes: input.notes,
            ..Default::default()
        };
        shift.recompute_status();
        let shift = self.collections.shifts.insert(shift).await?;

        self.audit
            .record(
                caller,
                "shift.created",
                "shift",
                &shift.id,
                json!({ "mission_id": shift.mission_id, "max_capacity": shift.max_capacity }),
            )
            .await;

        Ok(shift)
    }

    pub async fn update(&self, caller: &Caller, id: &str, input: ShiftInput) -> Result<ShiftDoc> {
        Self::validate(&input, false)?;
        let (mut shift, mission) = self.load_managed(caller, id).await?;
        Self::require_editable(&mission)?;
        if shift.status == ShiftStatus::Canceled {
            return Err(ApiError::invalid_field("status", "Η βάρδια έχει ακυρωθεί."));
        }

        let mut changes = serde_json::Map::new();
        if let Some(capacity) = input.max_capacity {
            let capacity = capacity as i32;
            if capacity < shift.current_count {
                return Err(ApiError::invalid_field(
                    "max_capacity",
                    format!(
                        "Η χωρητικότητα δεν μπορεί να είναι μικρότερη από τους {} εγκεκριμένους εθελοντές.",
                        shift.current_count
                    ),
                ));
            }
            changes.insert("max_capacity".into(), json!({ "from": shift.max_capacity, "to": capacity }));
            shift.max_capacity = capacity;
        }
        if let Some(ref leader) = input.leader_id {
            self.require_leader(leader).await?;
            shift.leader_id = Some(leader.clone());
            changes.insert("leader_id".into(), json!(leader));
        }
        if let Some(title) = input.title {
            shift.title = Some(title);
            changes.insert("title".into(), json!(shift.title));
        }
        if let Some(notes) = input.notes {
            shift.notes = Some(notes);
            changes.insert("notes".into(), json!(shift.notes));
        }
        if let Some(start_at) = input.start_at {
            shift.start_at = start_at;
            changes.insert("start_at".into(), json!(start_at));
        }
        if let Some(end_at) = input.end_at {
            shift.end_at = end_at;
            changes.insert("end_at".into(), json!(end_at));
        }
        Self::check_times(shift.start_at, shift.end_at)?;
        shift.recompute_status();

        let shift = self.collections.shifts.update(shift).await?;
        self.audit
            .record(caller, "shift.updated", "shift", id, changes.into())
            .await;

        Ok(shift)
    }

    /// Soft delete; refused while approved volunteers hold places. Pending
    /// requests of the deleted shift are canceled and their volunteers told.
    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        let (shift, _) = self.load_managed(caller, id).await?;
        if shift.current_count > 0 {
            return Err(ApiError::invalid_field(
                "shift",
                "Η βάρδια έχει εγκεκριμένους εθελοντές και δεν μπορεί να διαγραφεί.",
            ));
        }

        // Versioned: loses to an approval that took a place since the check
        self.collections.shifts.soft_delete(shift).await?;
        self.audit
            .record(caller, "shift.deleted", "shift", id, json!({}))
            .await;

        let reason = Some("Η βάρδια διαγράφηκε.".to_string());
        let pending = self
            .collections
            .participations
            .find(bson::doc! { "shift_id": id, "status": ParticipationStatus::Pending.as_str() })
            .await?;
        for request in pending {
            match cancel_by_admin(&self.collections, &request.id, &caller.actor.id, reason.clone()).await {
                Ok(Some(canceled)) => {
                    self.events.emit(DomainEvent::ParticipationCanceled {
                        request_id: canceled.id,
                        shift_id: canceled.shift_id,
                        mission_id: canceled.mission_id,
                        volunteer_id: canceled.volunteer_id,
                        by_admin: true,
                        reason: reason.clone(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(
                    shift_id = id,
                    request_id = %request.id,
                    "Failed to cancel request of deleted shift: {}",
                    e
                ),
            }
        }
        Ok(())
    }

    /// OPEN|FULL -> LOCKED: no further approvals
    pub async fn lock(&self, caller: &Caller, id: &str) -> Result<ShiftDoc> {
        let (mut shift, _) = self.load_managed(caller, id).await?;
        if !matches!(shift.status, ShiftStatus::Open | ShiftStatus::Full) {
            return Err(ApiError::invalid_field(
                "status",
                format!("Η βάρδια δεν μπορεί να κλειδωθεί από την κατάσταση {}.", shift.status),
            ));
        }

        let previous = shift.status;
        shift.status = ShiftStatus::Locked;
        let shift = self.collections.shifts.update(shift).await?;

        self.audit
            .record(caller, "shift.locked", "shift", id, json!({ "from": previous }))
            .await;
        Ok(shift)
    }

    /// LOCKED -> OPEN or FULL depending on the counters
    pub async fn unlock(&self, caller: &Caller, id: &str) -> Result<ShiftDoc> {
        let (mut shift, _) = self.load_managed(caller, id).await?;
        if shift.status != ShiftStatus::Locked {
            return Err(ApiError::invalid_field("status", "Η βάρδια δεν είναι κλειδωμένη."));
        }

        shift.status = ShiftStatus::Open;
        shift.recompute_status();
        let shift = self.collections.shifts.update(shift).await?;

        self.audit
            .record(caller, "shift.unlocked", "shift", id, json!({ "to": shift.status }))
            .await;
        Ok(shift)
    }
}
