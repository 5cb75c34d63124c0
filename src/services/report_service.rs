//! Report service - aggregate figures and CSV exports
//!
//! System administrators see the whole organization. Department
//! administrators see their own department only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::auth::permissions::can_view_reports;
use crate::auth::Role;
use crate::db::schemas::{
    MissionDoc, MissionStatus, ParticipationDoc, ParticipationStatus, ShiftDoc, ShiftStatus,
};
use crate::db::Collections;
use crate::types::{ApiError, Result};

use super::mission_service::fill_rate;
use super::Caller;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReportFilter {
    /// Narrow a system-wide report to one department
    pub department_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Missions,
    Shifts,
    Volunteers,
    Participations,
    Departments,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Missions => "missions",
            ExportKind::Shifts => "shifts",
            ExportKind::Volunteers => "volunteers",
            ExportKind::Participations => "participations",
            ExportKind::Departments => "departments",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub users: usize,
    pub active_volunteers: usize,
    pub departments: usize,
    pub missions: BTreeMap<String, usize>,
    pub shifts: usize,
    pub open_shifts: usize,
    pub pending_requests: usize,
    pub approved_participations: usize,
    pub total_capacity: i64,
    pub filled_slots: i64,
    pub fill_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionRow {
    pub id: String,
    pub title: String,
    pub department_id: String,
    pub department_name: Option<String>,
    pub status: MissionStatus,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub shift_count: usize,
    pub total_capacity: i64,
    pub filled_slots: i64,
    pub fill_rate: f64,
    pub pending_requests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShiftRow {
    pub id: String,
    pub mission_id: String,
    pub mission_title: String,
    pub title: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub max_capacity: i32,
    pub current_count: i32,
    pub status: ShiftStatus,
    pub leader_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolunteerRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department_id: Option<String>,
    pub approved_shifts: usize,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipationReport {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// `YYYY-MM` -> status -> count
    pub by_month: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentRow {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub is_active: bool,
    pub users: usize,
    pub missions: usize,
    pub published_missions: usize,
}

/// A rendered CSV export
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub file_name: String,
    pub body: String,
}

/// Department a report is restricted to; `None` means every department
struct Scope {
    department: Option<String>,
}

impl Scope {
    fn mission(&self, mission: &MissionDoc) -> bool {
        self.department(Some(mission.department_id.as_str()))
    }

    fn department(&self, department_id: Option<&str>) -> bool {
        match self.department.as_deref() {
            None => true,
            Some(scoped) => department_id == Some(scoped),
        }
    }
}

/// Everything a report reads, loaded once
struct Snapshot {
    missions: Vec<MissionDoc>,
    shifts: Vec<ShiftDoc>,
    requests: Vec<ParticipationDoc>,
}

fn in_range(at: Option<DateTime<Utc>>, filter: &ReportFilter) -> bool {
    match at {
        Some(at) => {
            filter.from.map_or(true, |from| at >= from) && filter.to.map_or(true, |to| at <= to)
        }
        None => filter.from.is_none() && filter.to.is_none(),
    }
}

/// Quote a CSV field when it contains a separator, quote or line break
pub(crate) fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub(crate) fn to_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str(
        &headers
            .iter()
            .map(|h| csv_field(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push_str("\r\n");
    for row in rows {
        out.push_str(&row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(","));
        out.push_str("\r\n");
    }
    out
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn rfc3339(value: Option<DateTime<Utc>>) -> String {
    value.map(|v| v.to_rfc3339()).unwrap_or_default()
}

pub struct ReportService {
    collections: Collections,
}

impl ReportService {
    pub fn new(collections: Collections) -> Self {
        Self { collections }
    }

    fn scope(caller: &Caller, filter: &ReportFilter) -> Result<Scope> {
        let actor = &caller.actor;
        if !can_view_reports(actor) {
            return Err(ApiError::Forbidden(
                "Δεν έχετε πρόσβαση στις αναφορές.".into(),
            ));
        }
        let department = if actor.is_system_admin() {
            filter.department_id.clone()
        } else {
            // Department admins without a department see nothing
            Some(actor.department_id.clone().unwrap_or_default())
        };
        Ok(Scope { department })
    }

    async fn snapshot(&self, scope: &Scope, filter: &ReportFilter) -> Result<Snapshot> {
        let missions: Vec<MissionDoc> = self
            .collections
            .missions
            .all()
            .await?
            .into_iter()
            .filter(|m| scope.mission(m))
            .filter(|m| in_range(m.start_at.or(m.metadata.created_at), filter))
            .collect();
        let mission_ids: std::collections::HashSet<&str> =
            missions.iter().map(|m| m.id.as_str()).collect();

        let shifts = self
            .collections
            .shifts
            .all()
            .await?
            .into_iter()
            .filter(|s| mission_ids.contains(s.mission_id.as_str()))
            .collect();
        let requests = self
            .collections
            .participations
            .all()
            .await?
            .into_iter()
            .filter(|r| mission_ids.contains(r.mission_id.as_str()))
            .collect();

        Ok(Snapshot {
            missions,
            shifts,
            requests,
        })
    }

    pub async fn dashboard(&self, caller: &Caller, filter: &ReportFilter) -> Result<Dashboard> {
        let scope = Self::scope(caller, filter)?;
        let snapshot = self.snapshot(&scope, filter).await?;

        let users: Vec<_> = self
            .collections
            .users
            .all()
            .await?
            .into_iter()
            .filter(|u| scope.department(u.department_id.as_deref()))
            .collect();
        let departments = self
            .collections
            .departments
            .all()
            .await?
            .into_iter()
            .filter(|d| scope.department(Some(d.id.as_str())))
            .count();

        let mut missions: BTreeMap<String, usize> = MissionStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for mission in &snapshot.missions {
            *missions.entry(mission.status.as_str().to_string()).or_default() += 1;
        }

        let live: Vec<&ShiftDoc> = snapshot
            .shifts
            .iter()
            .filter(|s| s.status != ShiftStatus::Canceled)
            .collect();
        let total_capacity: i64 = live.iter().map(|s| i64::from(s.max_capacity)).sum();
        let filled_slots: i64 = live.iter().map(|s| i64::from(s.current_count)).sum();

        Ok(Dashboard {
            users: users.len(),
            active_volunteers: users
                .iter()
                .filter(|u| u.is_active && u.role == Role::Volunteer)
                .count(),
            departments,
            missions,
            shifts: snapshot.shifts.len(),
            open_shifts: live.iter().filter(|s| s.status == ShiftStatus::Open).count(),
            pending_requests: snapshot
                .requests
                .iter()
                .filter(|r| r.status == ParticipationStatus::Pending)
                .count(),
            approved_participations: snapshot
                .requests
                .iter()
                .filter(|r| r.status == ParticipationStatus::Approved)
                .count(),
            total_capacity,
            filled_slots,
            fill_rate: fill_rate(filled_slots, total_capacity),
        })
    }

    pub async fn missions(&self, caller: &Caller, filter: &ReportFilter) -> Result<Vec<MissionRow>> {
        let scope = Self::scope(caller, filter)?;
        let snapshot = self.snapshot(&scope, filter).await?;

        let department_names: HashMap<String, String> = self
            .collections
            .departments
            .find_with_deleted(bson::Document::new())
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect();

        let mut rows: Vec<MissionRow> = snapshot
            .missions
            .iter()
            .map(|m| {
                let shifts: Vec<&ShiftDoc> = snapshot
                    .shifts
                    .iter()
                    .filter(|s| s.mission_id == m.id && s.status != ShiftStatus::Canceled)
                    .collect();
                let total_capacity: i64 = shifts.iter().map(|s| i64::from(s.max_capacity)).sum();
                let filled_slots: i64 = shifts.iter().map(|s| i64::from(s.current_count)).sum();
                MissionRow {
                    id: m.id.clone(),
                    title: m.title.clone(),
                    department_id: m.department_id.clone(),
                    department_name: department_names.get(&m.department_id).cloned(),
                    status: m.status,
                    start_at: m.start_at,
                    end_at: m.end_at,
                    shift_count: shifts.len(),
                    total_capacity,
                    filled_slots,
                    fill_rate: fill_rate(filled_slots, total_capacity),
                    pending_requests: snapshot
                        .requests
                        .iter()
                        .filter(|r| r.mission_id == m.id && r.status == ParticipationStatus::Pending)
                        .count(),
                }
            })
            .collect();

        rows.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.title.cmp(&b.title)));
        Ok(rows)
    }

    pub async fn shifts(&self, caller: &Caller, filter: &ReportFilter) -> Result<Vec<ShiftRow>> {
        let scope = Self::scope(caller, filter)?;
        let snapshot = self.snapshot(&scope, filter).await?;

        let titles: HashMap<&str, &str> = snapshot
            .missions
            .iter()
            .map(|m| (m.id.as_str(), m.title.as_str()))
            .collect();

        let mut rows: Vec<ShiftRow> = snapshot
            .shifts
            .iter()
            .map(|s| ShiftRow {
                id: s.id.clone(),
                mission_id: s.mission_id.clone(),
                mission_title: titles.get(s.mission_id.as_str()).unwrap_or(&"").to_string(),
                title: s.title.clone(),
                start_at: s.start_at,
                end_at: s.end_at,
                max_capacity: s.max_capacity,
                current_count: s.current_count,
                status: s.status,
                leader_id: s.leader_id.clone(),
            })
            .collect();

        rows.sort_by(|a, b| a.start_at.cmp(&b.start_at));
        Ok(rows)
    }

    /// Approved shifts and hours per volunteer, busiest first
    pub async fn volunteers(&self, caller: &Caller, filter: &ReportFilter) -> Result<Vec<VolunteerRow>> {
        let scope = Self::scope(caller, filter)?;
        let snapshot = self.snapshot(&scope, filter).await?;

        let shifts: HashMap<&str, &ShiftDoc> = snapshot
            .shifts
            .iter()
            .map(|s| (s.id.as_str(), s))
            .collect();

        let mut totals: HashMap<&str, (usize, f64)> = HashMap::new();
        for request in snapshot
            .requests
            .iter()
            .filter(|r| r.status == ParticipationStatus::Approved)
        {
            let hours = shifts
                .get(request.shift_id.as_str())
                .map(|s| s.hours())
                .unwrap_or(0.0);
            let entry = totals.entry(request.volunteer_id.as_str()).or_default();
            entry.0 += 1;
            entry.1 += hours;
        }

        let mut rows = Vec::with_capacity(totals.len());
        for (volunteer_id, (approved_shifts, total_hours)) in totals {
            let Some(user) = self.collections.users.get_with_deleted(volunteer_id).await? else {
                continue;
            };
            rows.push(VolunteerRow {
                id: user.id,
                name: user.name,
                email: user.email,
                department_id: user.department_id,
                approved_shifts,
                total_hours: (total_hours * 100.0).round() / 100.0,
            });
        }

        rows.sort_by(|a, b| {
            b.total_hours
                .total_cmp(&a.total_hours)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }

    pub async fn participations(&self, caller: &Caller, filter: &ReportFilter) -> Result<ParticipationReport> {
        let scope = Self::scope(caller, filter)?;
        let snapshot = self.snapshot(&scope, filter).await?;

        let mut by_status: BTreeMap<String, usize> = ParticipationStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_month: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

        for request in &snapshot.requests {
            *by_status.entry(request.status.as_str().to_string()).or_default() += 1;
            let month = request.metadata.created().format("%Y-%m").to_string();
            *by_month
                .entry(month)
                .or_default()
                .entry(request.status.as_str().to_string())
                .or_default() += 1;
        }

        Ok(ParticipationReport {
            total: snapshot.requests.len(),
            by_status,
            by_month,
        })
    }

    pub async fn departments(&self, caller: &Caller, filter: &ReportFilter) -> Result<Vec<DepartmentRow>> {
        let scope = Self::scope(caller, filter)?;
        let snapshot = self.snapshot(&scope, filter).await?;
        let users = self.collections.users.all().await?;

        let mut rows: Vec<DepartmentRow> = self
            .collections
            .departments
            .all()
            .await?
            .into_iter()
            .filter(|d| scope.department(Some(d.id.as_str())))
            .map(|d| {
                let missions: Vec<&MissionDoc> = snapshot
                    .missions
                    .iter()
                    .filter(|m| m.department_id == d.id)
                    .collect();
                DepartmentRow {
                    users: users
                        .iter()
                        .filter(|u| u.department_id.as_deref() == Some(d.id.as_str()))
                        .count(),
                    missions: missions.len(),
                    published_missions: missions
                        .iter()
                        .filter(|m| m.status == MissionStatus::Published)
                        .count(),
                    id: d.id,
                    name: d.name,
                    parent_id: d.parent_id,
                    is_active: d.is_active,
                }
            })
            .collect();

        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// Render one report as CSV
    pub async fn export(&self, caller: &Caller, kind: ExportKind, filter: &ReportFilter) -> Result<CsvExport> {
        let body = match kind {
            ExportKind::Missions => {
                let rows: Vec<Vec<String>> = self
                    .missions(caller, filter)
                    .await?
                    .into_iter()
                    .map(|r| {
                        vec![
                            r.id,
                            r.title,
                            r.department_name.unwrap_or(r.department_id),
                            r.status.to_string(),
                            rfc3339(r.start_at),
                            rfc3339(r.end_at),
                            r.shift_count.to_string(),
                            r.total_capacity.to_string(),
                            r.filled_slots.to_string(),
                            format!("{:.2}", r.fill_rate),
                            r.pending_requests.to_string(),
                        ]
                    })
                    .collect();
                to_csv(
                    &[
                        "id", "title", "department", "status", "start_at", "end_at", "shifts",
                        "capacity", "filled", "fill_rate", "pending",
                    ],
                    &rows,
                )
            }
            ExportKind::Shifts => {
                let rows: Vec<Vec<String>> = self
                    .shifts(caller, filter)
                    .await?
                    .into_iter()
                    .map(|r| {
                        vec![
                            r.id,
                            r.mission_title,
                            opt(&r.title),
                            r.start_at.to_rfc3339(),
                            r.end_at.to_rfc3339(),
                            r.max_capacity.to_string(),
                            r.current_count.to_string(),
                            r.status.to_string(),
                            opt(&r.leader_id),
                        ]
                    })
                    .collect();
                to_csv(
                    &[
                        "id", "mission", "title", "start_at", "end_at", "capacity", "filled",
                        "status", "leader_id",
                    ],
                    &rows,
                )
            }
            ExportKind::Volunteers => {
                let rows: Vec<Vec<String>> = self
                    .volunteers(caller, filter)
                    .await?
                    .into_iter()
                    .map(|r| {
                        vec![
                            r.id,
                            r.name,
                            r.email,
                            opt(&r.department_id),
                            r.approved_shifts.to_string(),
                            format!("{:.2}", r.total_hours),
                        ]
                    })
                    .collect();
                to_csv(
                    &["id", "name", "email", "department_id", "approved_shifts", "hours"],
                    &rows,
                )
            }
            ExportKind::Participations => {
                let report = self.participations(caller, filter).await?;
                let rows: Vec<Vec<String>> = report
                    .by_month
                    .into_iter()
                    .flat_map(|(month, statuses)| {
                        statuses
                            .into_iter()
                            .map(move |(status, count)| vec![month.clone(), status, count.to_string()])
                    })
                    .collect();
                to_csv(&["month", "status", "count"], &rows)
            }
            ExportKind::Departments => {
                let rows: Vec<Vec<String>> = self
                    .departments(caller, filter)
                    .await?
                    .into_iter()
                    .map(|r| {
                        vec![
                            r.id,
                            r.name,
                            opt(&r.parent_id),
                            r.is_active.to_string(),
                            r.users.to_string(),
                            r.missions.to_string(),
                            r.published_missions.to_string(),
                        ]
                    })
                    .collect();
                to_csv(
                    &["id", "name", "parent_id", "active", "users", "missions", "published"],
                    &rows,
                )
            }
        };

        Ok(CsvExport {
            file_name: format!("{}-{}.csv", kind.as_str(), Utc::now().format("%Y%m%d")),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_to_csv_layout() {
        let csv = to_csv(
            &["id", "title"],
            &[vec!["1".into(), "Δασοπροστασία, Πάρνηθα".into()]],
        );
        assert_eq!(csv, "id,title\r\n1,\"Δασοπροστασία, Πάρνηθα\"\r\n");
    }

    #[test]
    fn test_in_range() {
        let at = "2026-03-10T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let open = ReportFilter::default();
        assert!(in_range(Some(at), &open));
        assert!(in_range(None, &open));

        let march = ReportFilter {
            from: Some("2026-03-01T00:00:00Z".parse().unwrap()),
            to: Some("2026-03-31T23:59:59Z".parse().unwrap()),
            ..Default::default()
        };
        assert!(in_range(Some(at), &march));
        assert!(!in_range(None, &march));

        let april = ReportFilter {
            from: Some("2026-04-01T00:00:00Z".parse().unwrap()),
            ..Default::default()
        };
        assert!(!in_range(Some(at), &april));
    }
}
