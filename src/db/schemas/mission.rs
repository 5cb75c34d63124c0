//! Mission document schema

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const MISSION_COLLECTION: &str = "missions";

/// Mission lifecycle: DRAFT -> PUBLISHED -> CLOSED | CANCELED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    #[default]
    Draft,
    Published,
    Closed,
    Canceled,
}

impl MissionStatus {
    pub const ALL: [MissionStatus; 4] = [
        MissionStatus::Draft,
        MissionStatus::Published,
        MissionStatus::Closed,
        MissionStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Draft => "DRAFT",
            MissionStatus::Published => "PUBLISHED",
            MissionStatus::Closed => "CLOSED",
            MissionStatus::Canceled => "CANCELED",
        }
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_transition_to(&self, next: MissionStatus) -> bool {
        use MissionStatus::*;
        matches!(
            (self, next),
            (Draft, Published) | (Published, Closed) | (Draft, Canceled) | (Published, Canceled)
        )
    }

    /// Content may still be edited (mission fields, shifts)
    pub fn is_editable(&self) -> bool {
        matches!(self, MissionStatus::Draft | MissionStatus::Published)
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown mission status: {}", s))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MissionDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub department_id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status: MissionStatus,

    pub created_by: String,

    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cancel_reason: Option<String>,
}

impl Record for MissionDoc {
    const COLLECTION: &'static str = MISSION_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn indexes() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "department_id": 1 },
                Some(IndexOptions::builder().name("department_index".to_string()).build()),
            ),
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use MissionStatus::*;
        assert!(Draft.can_transition_to(Published));
        assert!(Published.can_transition_to(Closed));
        assert!(Published.can_transition_to(Canceled));
        assert!(Draft.can_transition_to(Canceled));

        assert!(!Draft.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Published));
        assert!(!Canceled.can_transition_to(Published));
        assert!(!Closed.can_transition_to(Canceled));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("published".parse::<MissionStatus>().unwrap(), MissionStatus::Published);
        assert!("archived".parse::<MissionStatus>().is_err());
    }
}
