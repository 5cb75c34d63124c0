//! Mission service - mission lifecycle and its cascades
//!
//! Missions move DRAFT -> PUBLISHED -> CLOSED, or to CANCELED from either
//! of the first two. Canceling a mission cancels its shifts and every active
//! participation request in them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::permissions::{can_manage_department, can_manage_mission, can_view_mission};
use crate::db::schemas::{
    MissionDoc, MissionStatus, ParticipationStatus, ShiftDoc, ShiftStatus,
};
use crate::db::Collections;
use crate::types::{ApiError, Result, Validator};

use super::events::{DomainEvent, EventBus};
use super::pagination::{matches_search, Page, PageRequest};
use super::participation_service::cancel_by_admin;
use super::{with_retry, AuditService, Caller};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MissionFilter {
    pub status: Option<MissionStatus>,
    pub department_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MissionInput {
    pub department_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CancelInput {
    pub reason: Option<String>,
}

/// Capacity and request figures for one mission
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MissionStats {
    pub mission_id: String,
    pub status: MissionStatus,
    pub shift_count: usize,
    pub total_capacity: i64,
    pub filled_slots: i64,
    pub available_slots: i64,
    /// Filled share of capacity in percent, two decimals
    pub fill_rate: f64,
    pub requests: BTreeMap<String, usize>,
}

pub struct MissionService {
    collections: Collections,
    audit: Arc<AuditService>,
    events: Arc<EventBus>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Η αποστολή δεν βρέθηκε.".into())
}

fn forbidden() -> ApiError {
    ApiError::Forbidden("Δεν έχετε δικαίωμα διαχείρισης αυτής της αποστολής.".into())
}

fn invalid_transition(from: MissionStatus, to: MissionStatus) -> ApiError {
    ApiError::invalid_field(
        "status",
        format!(
            "Η αποστολή δεν μπορεί να μεταβεί από {} σε {}.",
            from, to
        ),
    )
}

/// Percentage with two decimals, zero when there is no capacity
pub(crate) fn fill_rate(filled: i64, capacity: i64) -> f64 {
    if capacity <= 0 {
        return 0.0;
    }
    (filled as f64 * 10_000.0 / capacity as f64).round() / 100.0
}

impl MissionService {
    pub fn new(collections: Collections, audit: Arc<AuditService>, events: Arc<EventBus>) -> Self {
        Self {
            collections,
            audit,
            events,
        }
    }

    /// Load a mission the caller is allowed to see.
    ///
    /// Hidden drafts answer 404 so their existence does not leak.
    pub async fn load_visible(&self, caller: &Caller, id: &str) -> Result<MissionDoc> {
        let mission = self.collections.missions.get(id).await?.ok_or_else(not_found)?;
        if !can_view_mission(&caller.actor, &mission) {
            return Err(not_found());
        }
        Ok(mission)
    }

    async fn load_managed(&self, caller: &Caller, id: &str) -> Result<MissionDoc> {
        let mission = self.load_visible(caller, id).await?;
        if !can_manage_mission(&caller.actor, &mission) {
            return Err(forbidden());
        }
        Ok(mission)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub async fn list(
        &self,
        caller: &Caller,
        filter: &MissionFilter,
        page: PageRequest,
    ) -> Result<Page<MissionDoc>> {
        let actor = &caller.actor;
        let mut missions: Vec<MissionDoc> = self
            .collections
            .missions
            .all()
            .await?
            .into_iter()
            // Volunteers and shift leaders only browse published missions
            .filter(|m| actor.role.is_admin() || m.status == MissionStatus::Published)
            .filter(|m| can_view_mission(actor, m))
            .filter(|m| filter.status.map_or(true, |s| m.status == s))
            .filter(|m| {
                filter
                    .department_id
                    .as_deref()
                    .map_or(true, |d| m.department_id == d)
            })
            .filter(|m| {
                matches_search(
                    filter.search.as_deref(),
                    &[
                        Some(m.title.as_str()),
                        m.description.as_deref(),
                        m.location.as_deref(),
                    ],
                )
            })
            .collect();

        // Upcoming first, undated last
        missions.sort_by(|a, b| match (a.start_at, b.start_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.metadata.created().cmp(&a.metadata.created()),
        });

        Ok(Page::from_vec(missions, page))
    }

    pub async fn get(&self, caller: &Caller, id: &str) -> Result<MissionDoc> {
        self.load_visible(caller, id).await
    }

    pub async fn stats(&self, caller: &Caller, id: &str) -> Result<MissionStats> {
        let mission = self.load_managed(caller, id).await?;

        let shifts = self
            .collections
            .shifts
            .find(bson::doc! { "mission_id": id })
            .await?;
        let requests = self
            .collections
            .participations
            .find(bson::doc! { "mission_id": id })
            .await?;

        let live: Vec<&ShiftDoc> = shifts
            .iter()
            .filter(|s| s.status != ShiftStatus::Canceled)
            .collect();
        let total_capacity: i64 = live.iter().map(|s| i64::from(s.max_capacity)).sum();
        let filled_slots: i64 = live.iter().map(|s| i64::from(s.current_count)).sum();

        let mut per_status: BTreeMap<String, usize> = ParticipationStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for request in &requests {
            *per_status.entry(request.status.as_str().to_string()).or_default() += 1;
        }

        Ok(MissionStats {
            mission_id: mission.id,
            status: mission.status,
            shift_count: shifts.len(),
            total_capacity,
            filled_slots,
            available_slots: (total_capacity - filled_slots).max(0),
            fill_rate: fill_rate(filled_slots, total_capacity),
            requests: per_status,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    fn validate(input: &MissionInput, creating: bool) -> Result<()> {
        let mut v = Validator::new();
        if creating {
            v.required("department_id", input.department_id.as_deref())
                .required("title", input.title.as_deref());
        } else {
            v.check(
                input.title.as_deref().map_or(true, |t| !t.trim().is_empty()),
                "title",
                "Το πεδίο title δεν μπορεί να είναι κενό.",
            );
        }
        v.max_len("title", input.title.as_deref(), 255)
            .max_len("description", input.description.as_deref(), 5000)
            .max_len("location", input.location.as_deref(), 255);
        v.finish()
    }

    fn check_dates(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(ApiError::invalid_field(
                    "end_at",
                    "Η λήξη πρέπει να είναι μετά την έναρξη.",
                ));
            }
        }
        Ok(())
    }

    async fn require_department(&self, department_id: &str) -> Result<()> {
        if self.collections.departments.get(department_id).await?.is_none() {
            return Err(ApiError::invalid_field("department_id", "Το τμήμα δεν υπάρχει."));
        }
        Ok(())
    }

    pub async fn create(&self, caller: &Caller, input: MissionInput) -> Result<MissionDoc> {
        Self::validate(&input, true)?;
        Self::check_dates(input.start_at, input.end_at)?;

        let department_id = input.department_id.unwrap_or_default();
        if !can_manage_department(&caller.actor, &department_id) {
            return Err(forbidden());
        }
        self.require_department(&department_id).await?;

        let mission = MissionDoc {
            id: uuid::Uuid::new_v4().to_string(),
            department_id,
            title: input.title.unwrap_or_default().trim().to_string(),
            description: input.description,
            location: input.location,
            start_at: input.start_at,
            end_at: input.end_at,
            status: MissionStatus::Draft,
            created_by: caller.actor.id.clone(),
            ..Default::default()
        };
        let mission = self.collections.missions.insert(mission).await?;

        self.audit
            .record(
                caller,
                "mission.created",
                "mission",
                &mission.id,
                json!({ "title": mission.title, "department_id": mission.department_id }),
            )
            .await;

        Ok(mission)
    }

    pub async fn update(&self, caller: &Caller, id: &str, input: MissionInput) -> Result<MissionDoc> {
        Self::validate(&input, false)?;
        let mut mission = self.load_managed(caller, id).await?;

        if !mission.status.is_editable() {
            return Err(ApiError::invalid_field(
                "status",
                "Η αποστολή δεν μπορεί πλέον να τροποποιηθεί.",
            ));
        }

        let mut changes = serde_json::Map::new();
        if let Some(department_id) = input.department_id {
            if department_id != mission.department_id {
                if !can_manage_department(&caller.actor, &department_id) {
                    return Err(forbidden());
                }
                self.require_department(&department_id).await?;
                changes.insert("department_id".into(), json!(department_id));
                mission.department_id = department_id;
            }
        }
        if let Some(title) = input.title {
            mission.title = title.trim().to_string();
            changes.insert("title".into(), json!(mission.title));
        }
        if let Some(description) = input.description {
            mission.description = Some(description);
            changes.insert("description".into(), json!(mission.description));
        }
        if let Some(location) = input.location {
            mission.location = Some(location);
            changes.insert("location".into(), json!(mission.location));
        }
        if input.start_at.is_some() {
            mission.start_at = input.start_at;
            changes.insert("start_at".into(), json!(mission.start_at));
        }
        if input.end_at.is_some() {
            mission.end_at = input.end_at;
            changes.insert("end_at".into(), json!(mission.end_at));
        }
        Self::check_dates(mission.start_at, mission.end_at)?;

        let mission = self.collections.missions.update(mission).await?;
        self.audit
            .record(caller, "mission.updated", "mission", id, changes.into())
            .await;

        Ok(mission)
    }

    /// Drafts only; their shifts go with them
    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        let mission = self.load_managed(caller, id).await?;
        if mission.status != MissionStatus::Draft {
            return Err(ApiError::invalid_field(
                "status",
                "Μόνο πρόχειρες αποστολές μπορούν να διαγραφούν.",
            ));
        }

        for shift in self
            .collections
            .shifts
            .find(bson::doc! { "mission_id": id })
            .await?
        {
            self.collections.shifts.soft_delete(shift).await?;
        }
        self.collections.missions.soft_delete(mission).await?;

        self.audit
            .record(caller, "mission.deleted", "mission", id, json!({}))
            .await;
        Ok(())
    }

    async fn transition(
        &self,
        caller: &Caller,
        id: &str,
        next: MissionStatus,
        reason: Option<String>,
    ) -> Result<MissionDoc> {
        let mut mission = self.load_managed(caller, id).await?;
        if !mission.status.can_transition_to(next) {
            return Err(invalid_transition(mission.status, next));
        }

        let previous = mission.status;
        let now = Utc::now();
        mission.status = next;
        match next {
            MissionStatus::Published => mission.published_at = Some(now),
            MissionStatus::Closed => mission.closed_at = Some(now),
            MissionStatus::Canceled => {
                mission.canceled_at = Some(now);
                mission.cancel_reason = reason.clone();
            }
            MissionStatus::Draft => {}
        }
        let mission = self.collections.missions.update(mission).await?;

        info!(mission_id = %mission.id, from = %previous, to = %next, "Mission status changed");
        self.audit
            .record(
                caller,
                &format!("mission.{}", next.as_str().to_lowercase()),
                "mission",
                id,
                json!({ "from": previous, "to": next, "reason": reason }),
            )
            .await;

        Ok(mission)
    }

    pub async fn publish(&self, caller: &Caller, id: &str) -> Result<MissionDoc> {
        let mission = self
            .transition(caller, id, MissionStatus::Published, None)
            .await?;
        self.events.emit(DomainEvent::MissionPublished {
            mission_id: mission.id.clone(),
            department_id: mission.department_id.clone(),
            title: mission.title.clone(),
        });
        Ok(mission)
    }

    pub async fn close(&self, caller: &Caller, id: &str) -> Result<MissionDoc> {
        self.transition(caller, id, MissionStatus::Closed, None)
            .await
    }

    /// Cancel the mission, its shifts and their active requests.
    ///
    /// Canceling a mission that is already CANCELED runs the cascade again,
    /// so a cascade cut short by failed writes is finished by repeating the
    /// call.
    pub async fn cancel(&self, caller: &Caller, id: &str, input: CancelInput) -> Result<MissionDoc> {
        let current = self.load_managed(caller, id).await?;
        let mission = if current.status == MissionStatus::Canceled {
            info!(mission_id = %id, "Mission already canceled, resuming cascade");
            current
        } else {
            let reason = input.reason.filter(|r| !r.trim().is_empty());
            self.transition(caller, id, MissionStatus::Canceled, reason)
                .await?
        };
        let reason = mission.cancel_reason.clone();
        let mut failures = 0usize;

        // Shifts first, so no approval takes a place while requests are canceled
        let shifts = self
            .collections
            .shifts
            .find(bson::doc! { "mission_id": id })
            .await?;
        let collection = &self.collections.shifts;
        for shift in shifts.into_iter().filter(|s| s.status != ShiftStatus::Canceled) {
            let shift_id = shift.id.as_str();
            let result = with_retry(move || async move {
                let Some(mut shift) = collection.get(shift_id).await? else {
                    return Ok(());
                };
                if shift.status == ShiftStatus::Canceled {
                    return Ok(());
                }
                shift.status = ShiftStatus::Canceled;
                collection.update(shift).await.map(|_| ())
            })
            .await;
            if let Err(e) = result {
                warn!(mission_id = %id, shift_id, "Failed to cancel shift: {}", e);
                failures += 1;
            }
        }

        let mut volunteer_ids = Vec::new();
        let requests = self
            .collections
            .participations
            .find(bson::doc! { "mission_id": id })
            .await?;
        for request in requests.into_iter().filter(|r| r.status.is_active()) {
            match cancel_by_admin(&self.collections, &request.id, &caller.actor.id, reason.clone()).await {
                Ok(Some(canceled)) => {
                    if !volunteer_ids.contains(&canceled.volunteer_id) {
                        volunteer_ids.push(canceled.volunteer_id);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(mission_id = %id, request_id = %request.id, "Failed to cancel request: {}", e);
                    failures += 1;
                }
            }
        }

        self.audit
            .record(
                caller,
                "mission.cascade_canceled",
                "mission",
                id,
                json!({ "canceled_volunteers": volunteer_ids.len(), "failures": failures }),
            )
            .await;
        self.events.emit(DomainEvent::MissionCanceled {
            mission_id: mission.id.clone(),
            title: mission.title.clone(),
            reason,
            volunteer_ids,
        });

        if failures > 0 {
            return Err(ApiError::Conflict(format!(
                "Η αποστολή ακυρώθηκε αλλά {} εγγραφές δεν ενημερώθηκαν. Επαναλάβετε την ακύρωση.",
                failures
            )));
        }
        Ok(mission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rate() {
        assert_eq!(fill_rate(0, 0), 0.0);
        assert_eq!(fill_rate(1, 3), 33.33);
        assert_eq!(fill_rate(5, 5), 100.0);
    }
}
