//! Shift document schema
//!
//! A shift is a time slot inside a mission with a fixed number of places.
//! `current_count` counts approved participants and never exceeds
//! `max_capacity`.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::collection::Record;
use crate::db::schemas::Metadata;

pub const SHIFT_COLLECTION: &str = "shifts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftStatus {
    #[default]
    Open,
    Full,
    Locked,
    Canceled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Open => "OPEN",
            ShiftStatus::Full => "FULL",
            ShiftStatus::Locked => "LOCKED",
            ShiftStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a capacity change was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    /// No free places left
    Full,
    /// Shift does not accept changes in its current status
    Closed(ShiftStatus),
    /// Nothing to release
    Empty,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ShiftDoc {
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub mission_id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub leader_id: Option<String>,

    pub start_at: DateTime<Utc>,

    pub end_at: DateTime<Utc>,

    pub max_capacity: i32,

    #[serde(default)]
    pub current_count: i32,

    #[serde(default)]
    pub status: ShiftStatus,

    #[serde(default)]
    pub notes: Option<String>,
}

impl ShiftDoc {
    pub fn available_slots(&self) -> i32 {
        (self.max_capacity - self.current_count).max(0)
    }

    /// Re-derive OPEN/FULL from the counters. LOCKED and CANCELED are sticky.
    pub fn recompute_status(&mut self) {
        if matches!(self.status, ShiftStatus::Locked | ShiftStatus::Canceled) {
            return;
        }
        self.status = if self.current_count >= self.max_capacity {
            ShiftStatus::Full
        } else {
            ShiftStatus::Open
        };
    }

    /// Take one place for an approved participant
    pub fn occupy(&mut self) -> Result<(), CapacityError> {
        match self.status {
            ShiftStatus::Locked | ShiftStatus::Canceled => {
                return Err(CapacityError::Closed(self.status))
            }
            ShiftStatus::Open | ShiftStatus::Full => {}
        }
        if self.available_slots() == 0 {
            return Err(CapacityError::Full);
        }
        self.current_count += 1;
        self.recompute_status();
        Ok(())
    }

    /// Give back one place. Allowed in every status so cancellations of
    /// locked shifts still keep the counter honest.
    pub fn release(&mut self) -> Result<(), CapacityError> {
        if self.current_count <= 0 {
            return Err(CapacityError::Empty);
        }
        self.current_count -= 1;
        self.recompute_status();
        Ok(())
    }

    /// Duration in hours, used by volunteer reports
    pub fn hours(&self) -> f64 {
        (self.end_at - self.start_at).num_minutes().max(0) as f64 / 60.0
    }
}

impl Record for ShiftDoc {
    const COLLECTION: &'static str = SHIFT_COLLECTION;

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
        vec![(
            doc! { "mission_id": 1 },
            Some(IndexOptions::builder().name("mission_index".to_string()).build()),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(max: i32, count: i32) -> ShiftDoc {
        let mut s = ShiftDoc {
            max_capacity: max,
            current_count: count,
            start_at: Utc::now(),
            end_at: Utc::now() + chrono::Duration::hours(3),
            ..Default::default()
        };
        s.recompute_status();
        s
    }

    #[test]
    fn test_occupy_until_full() {
        let mut s = shift(2, 0);
        assert_eq!(s.status, ShiftStatus::Open);

        s.occupy().unwrap();
        assert_eq!(s.status, ShiftStatus::Open);
        s.occupy().unwrap();
        assert_eq!(s.status, ShiftStatus::Full);
        assert_eq!(s.occupy(), Err(CapacityError::Full));
        assert_eq!(s.current_count, 2);
    }

    #[test]
    fn test_release_reopens() {
        let mut s = shift(1, 1);
        assert_eq!(s.status, ShiftStatus::Full);
        s.release().unwrap();
        assert_eq!(s.status, ShiftStatus::Open);
        assert_eq!(s.release(), Err(CapacityError::Empty));
    }

    #[test]
    fn test_locked_is_sticky() {
        let mut s = shift(3, 1);
        s.status = ShiftStatus::Locked;
        assert_eq!(s.occupy(), Err(CapacityError::Closed(ShiftStatus::Locked)));

        s.release().unwrap();
        assert_eq!(s.status, ShiftStatus::Locked);
        assert_eq!(s.current_count, 0);
    }

    #[test]
    fn test_hours() {
        let s = shift(1, 0);
        assert!((s.hours() - 3.0).abs() < f64::EPSILON);
    }
}
