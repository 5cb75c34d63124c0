//! Participation request document schema

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const PARTICIPATION_COLLECTION: &str = "participation_requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    CanceledByUser,
    CanceledByAdmin,
}

impl ParticipationStatus {
    pub const ALL: [ParticipationStatus; 5] = [
        ParticipationStatus::Pending,
        ParticipationStatus::Approved,
        ParticipationStatus::Rejected,
        ParticipationStatus::CanceledByUser,
        ParticipationStatus::CanceledByAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationStatus::Pending => "PENDING",
            ParticipationStatus::Approved => "APPROVED",
            ParticipationStatus::Rejected => "REJECTED",
            ParticipationStatus::CanceledByUser => "CANCELED_BY_USER",
            ParticipationStatus::CanceledByAdmin => "CANCELED_BY_ADMIN",
        }
    }

    /// Pending and approved requests hold (or may hold) a place
    pub fn is_active(&self) -> bool {
        matches!(self, ParticipationStatus::Pending | ParticipationStatus::Approved)
    }
}

impl fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParticipationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParticipationStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown participation status: {}", s))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ParticipationDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub shift_id: String,

    /// Denormalized from the shift so mission-level queries stay single-collection
    pub mission_id: String,

    pub volunteer_id: String,

    #[serde(default)]
    pub status: ParticipationStatus,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub rejection_reason: Option<String>,

    #[serde(default)]
    pub decided_by: Option<String>,

    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cancel_reason: Option<String>,
}

impl Record for ParticipationDoc {
    const COLLECTION: &'static str = PARTICIPATION_COLLECTION;

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
                doc! { "shift_id": 1, "volunteer_id": 1 },
                Some(IndexOptions::builder().name("shift_volunteer_index".to_string()).build()),
            ),
            (
                doc! { "mission_id": 1 },
                Some(IndexOptions::builder().name("mission_index".to_string()).build()),
            ),
            (
                doc! { "volunteer_id": 1 },
                Some(IndexOptions::builder().name("volunteer_index".to_string()).build()),
            ),
        ]
    }
}
