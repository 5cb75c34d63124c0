//! Roles and authorization policies
//!
//! Policies are plain predicates over the authenticated [`Actor`] and the
//! record being touched. Services call them before every mutation and turn
//! a `false` into a 403.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::schemas::{DocumentDoc, MissionDoc, MissionStatus, ShiftDoc, UserDoc, Visibility};

/// User roles, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Role {
    /// Regular member who applies for shifts
    #[default]
    Volunteer = 0,
    /// Coordinates the shifts they are assigned to
    ShiftLeader = 1,
    /// Manages missions of one department
    DepartmentAdmin = 2,
    /// Full access
    SystemAdmin = 3,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Volunteer => "VOLUNTEER",
            Role::ShiftLeader => "SHIFT_LEADER",
            Role::DepartmentAdmin => "DEPARTMENT_ADMIN",
            Role::SystemAdmin => "SYSTEM_ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        *self >= Role::DepartmentAdmin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "VOLUNTEER" => Ok(Role::Volunteer),
            "SHIFT_LEADER" => Ok(Role::ShiftLeader),
            "DEPARTMENT_ADMIN" => Ok(Role::DepartmentAdmin),
            "SYSTEM_ADMIN" => Ok(Role::SystemAdmin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<String>,
}

impl Actor {
    pub fn from_user(user: &UserDoc) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            department_id: user.department_id.clone(),
        }
    }

    pub fn is_system_admin(&self) -> bool {
        self.role == Role::SystemAdmin
    }

    fn belongs_to(&self, department_id: &str) -> bool {
        self.department_id.as_deref() == Some(department_id)
    }
}

/// System admins manage everything; department admins manage their own department
pub fn can_manage_department(actor: &Actor, department_id: &str) -> bool {
    actor.is_system_admin() || (actor.role == Role::DepartmentAdmin && actor.belongs_to(department_id))
}

pub fn can_manage_mission(actor: &Actor, mission: &MissionDoc) -> bool {
    can_manage_department(actor, &mission.department_id)
}

/// Mission managers plus the leader assigned to the shift
pub fn can_lead_shift(actor: &Actor, shift: &ShiftDoc, mission: &MissionDoc) -> bool {
    can_manage_mission(actor, mission) || shift.leader_id.as_deref() == Some(actor.id.as_str())
}

/// Drafts stay hidden from everyone who cannot manage them
pub fn can_view_mission(actor: &Actor, mission: &MissionDoc) -> bool {
    mission.status != MissionStatus::Draft || can_manage_mission(actor, mission)
}

pub fn can_view_document(actor: &Actor, document: &DocumentDoc) -> bool {
    if actor.is_system_admin() || document.owner_id == actor.id {
        return true;
    }
    match document.visibility {
        Visibility::Public => true,
        Visibility::Department => match document.department_id.as_deref() {
            Some(dept) => actor.belongs_to(dept) || can_manage_department(actor, dept),
            None => true,
        },
        Visibility::Admins => actor.role.is_admin(),
        Visibility::Private => false,
    }
}

pub fn can_modify_document(actor: &Actor, document: &DocumentDoc) -> bool {
    actor.is_system_admin()
        || document.owner_id == actor.id
        || document
            .department_id
            .as_deref()
            .map(|dept| can_manage_department(actor, dept))
            .unwrap_or(false)
}

/// Reports are open to system admins and department admins
pub fn can_view_reports(actor: &Actor) -> bool {
    actor.role.is_admin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, dept: Option<&str>) -> Actor {
        Actor {
            id: "user-1".into(),
            name: "Test".into(),
            email: "test@example.org".into(),
            role,
            department_id: dept.map(String::from),
        }
    }

    fn mission(dept: &str, status: MissionStatus) -> MissionDoc {
        MissionDoc {
            department_id: dept.into(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::SystemAdmin > Role::DepartmentAdmin);
        assert!(Role::DepartmentAdmin > Role::ShiftLeader);
        assert!(Role::ShiftLeader > Role::Volunteer);
        assert!(Role::DepartmentAdmin.is_admin());
        assert!(!Role::ShiftLeader.is_admin());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("system_admin".parse::<Role>().unwrap(), Role::SystemAdmin);
        assert_eq!("VOLUNTEER".parse::<Role>().unwrap(), Role::Volunteer);
        assert!("overlord".parse::<Role>().is_err());
    }

    #[test]
    fn test_department_admin_scoped_to_department() {
        let admin = actor(Role::DepartmentAdmin, Some("dept-a"));
        assert!(can_manage_mission(&admin, &mission("dept-a", MissionStatus::Draft)));
        assert!(!can_manage_mission(&admin, &mission("dept-b", MissionStatus::Draft)));

        let root = actor(Role::SystemAdmin, None);
        assert!(can_manage_mission(&root, &mission("dept-b", MissionStatus::Draft)));
    }

    #[test]
    fn test_drafts_hidden_from_volunteers() {
        let volunteer = actor(Role::Volunteer, Some("dept-a"));
        assert!(!can_view_mission(&volunteer, &mission("dept-a", MissionStatus::Draft)));
        assert!(can_view_mission(&volunteer, &mission("dept-a", MissionStatus::Published)));
    }

    #[test]
    fn test_shift_leader_leads_own_shift_only() {
        let leader = actor(Role::ShiftLeader, Some("dept-a"));
        let m = mission("dept-a", MissionStatus::Published);
        let own = ShiftDoc {
            leader_id: Some("user-1".into()),
            ..Default::default()
        };
        let other = ShiftDoc {
            leader_id: Some("user-9".into()),
            ..Default::default()
        };
        assert!(can_lead_shift(&leader, &own, &m));
        assert!(!can_lead_shift(&leader, &other, &m));
    }

    #[test]
    fn test_document_visibility() {
        let volunteer = actor(Role::Volunteer, Some("dept-a"));
        let mut doc = DocumentDoc {
            owner_id: "someone-else".into(),
            department_id: Some("dept-a".into()),
            visibility: Visibility::Department,
            ..Default::default()
        };
        assert!(can_view_document(&volunteer, &doc));

        doc.department_id = Some("dept-b".into());
        assert!(!can_view_document(&volunteer, &doc));

        doc.visibility = Visibility::Admins;
        assert!(!can_view_document(&volunteer, &doc));
        assert!(can_view_document(&actor(Role::DepartmentAdmin, Some("dept-z")), &doc));

        doc.visibility = Visibility::Private;
        assert!(!can_view_document(&actor(Role::DepartmentAdmin, Some("dept-b")), &doc));
        assert!(can_view_document(&actor(Role::SystemAdmin, None), &doc));

        doc.visibility = Visibility::Public;
        assert!(can_view_document(&volunteer, &doc));
    }
}
