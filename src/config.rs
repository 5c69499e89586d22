//! Support for library configuration options

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Scheme of the identity markers stored into the events this crate manages (e.g. `taskcal://task/42?project=7`)
pub const MARKER_SCHEME: &str = "taskcal";

/// Name of the calendar that is created in "single calendar" mode.
/// Feel free to override it when initing this library.
pub static SINGLE_CALENDAR_NAME: Lazy<Arc<Mutex<String>>> = Lazy::new(|| Arc::new(Mutex::new("Tasks".to_string())));

/// Prepended to the project title to name calendars in "one calendar per project" mode.
/// Feel free to override it when initing this library.
pub static PER_PROJECT_CALENDAR_PREFIX: Lazy<Arc<Mutex<String>>> = Lazy::new(|| Arc::new(Mutex::new(String::new())));

pub(crate) fn single_calendar_name() -> String {
    SINGLE_CALENDAR_NAME.lock()
        .map(|name| name.clone())
        .unwrap_or_else(|_| "Tasks".to_string())
}

pub(crate) fn project_calendar_name(project_title: &str) -> String {
    let prefix = PER_PROJECT_CALENDAR_PREFIX.lock()
        .map(|prefix| prefix.clone())
        .unwrap_or_default();
    format!("{}{}", prefix, project_title)
}

/// Tunables of a [`SyncEngine`](crate::engine::SyncEngine)
///
/// This can be deserialized from JSON. Missing fields take their default value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// How far in the past tasks are pulled
    pub pull_past_weeks: i64,
    /// How far in the future tasks are pulled
    pub pull_future_months: u32,
    /// How far in the past and in the future calendar events are scanned for user edits
    pub push_window_months: u32,
    /// Quiet interval after the last calendar change notification, before a push is started
    pub debounce_millis: u64,
    /// How many errors are kept for inspection after a sync pass
    pub max_errors: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pull_past_weeks: 8,
            pull_future_months: 12,
            push_window_months: 6,
            debounce_millis: 2000,
            max_errors: 50,
        }
    }
}

impl SyncSettings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn debounce_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.debounce_millis)
    }
}
