//! Calendar events, as owned by the calendar store

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::ids::{CalendarId, EventId};

/// A native calendar event
///
/// This is a plain record: the calendar store owns events, and both this crate and the user (through their calendar app) may modify them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The handle of this event in the calendar store. `None` until the store has created it.
    pub id: Option<EventId>,
    pub calendar_id: CalendarId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    /// Alarm offsets, in seconds, relative to `start`
    pub alarms: Vec<i64>,
    /// Free text, that also carries the signature of the last write made by this crate
    pub notes: Option<String>,
    /// The identity marker that links this event to its task (see [`crate::identity::IdentityMarker`])
    pub url: Option<String>,
    /// Maintained by the calendar store
    pub last_modified: DateTime<Utc>,
}

impl Event {
    /// Create an empty event, that is not in the calendar store yet
    pub fn new(calendar_id: CalendarId) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            calendar_id,
            title: String::new(),
            start: now,
            end: now,
            is_all_day: false,
            alarms: Vec::new(),
            notes: None,
            url: None,
            last_modified: now,
        }
    }

    /// Whether both events would look the same in a calendar app
    ///
    /// Store-managed attributes (id, last modification date) are ignored.
    pub fn has_same_content_as(&self, other: &Event) -> bool {
           self.calendar_id == other.calendar_id
        && self.title == other.title
        && self.start == other.start
        && self.end == other.end
        && self.is_all_day == other.is_all_day
        && self.alarms == other.alarms
        && self.notes == other.notes
        && self.url == other.url
    }
}

/// The task-side content of an event, as last written by this crate
///
/// This is stored as a baseline, so that edits made in the calendar can be sent as minimal patches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenFields {
    pub title: String,
    /// Notes, without signature. Empty notes are `None`.
    pub notes: Option<String>,
    pub due: DateTime<Utc>,
    pub is_all_day: bool,
    /// Sorted reminder offsets, relative to `due`
    pub reminders: Vec<i64>,
}

/// A closed time interval. Both bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Whether `[start, end]` has at least one instant in common with this range
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && self.start <= end
    }
}
