//! Translation between tasks and calendar events

use chrono::{Duration, NaiveTime, TimeZone, Utc};

use crate::error::Result;
use crate::event::{Event, WrittenFields};
use crate::identity::IdentityMarker;
use crate::signature;
use crate::task::{Task, TaskPatch};

/// Timed tasks are shown as a block of this length, ending at their due time
const TIMED_EVENT_LENGTH_SECS: i64 = 3600;

/// Translates tasks into calendar events, and calendar edits back into task patches
pub struct TaskEventMapper;

impl TaskEventMapper {
    /// Update `event` so that it represents `task`.
    ///
    /// Returns `false` (and leaves `event` untouched) in case the task has no due date, and thus must not appear in the calendar.
    pub fn apply(task: &Task, event: &mut Event) -> bool {
        let due = match task.due() {
            None => return false,
            Some(due) => due,
        };

        if task.is_all_day() {
            let start = Utc.from_utc_datetime(&due.date_naive().and_time(NaiveTime::default()));
            event.start = start;
            event.end = start + Duration::hours(24);
            event.alarms = task.reminders().to_vec();
        } else {
            // Alarms are relative to the start of the event, not to the due date
            event.start = due - Duration::seconds(TIMED_EVENT_LENGTH_SECS);
            event.end = due;
            event.alarms = task.reminders().iter()
                .map(|offset| offset + TIMED_EVENT_LENGTH_SECS)
                .collect();
        }
        event.title = task.title().to_string();
        event.is_all_day = task.is_all_day();
        event.url = Some(IdentityMarker::new(task.id().clone(), task.project_id().clone()).to_string());
        event.notes = task.notes().map(|notes| notes.to_string());

        // This must come last, so that the signature covers everything we have written
        Self::restamp(event);
        true
    }

    /// Replace the signature embedded in the event notes with the signature of its current content
    pub fn restamp(event: &mut Event) {
        let sig = Self::signature_of(event);
        event.notes = Some(signature::embed(event.notes.as_deref(), &sig));
    }

    /// Whether this event has been modified since its signature was embedded
    pub fn is_modified(event: &Event) -> bool {
        let embedded = event.notes.as_deref().and_then(signature::extract);
        embedded != Some(Self::signature_of(event).as_str())
    }

    /// The task-side content of an event
    pub fn fields(event: &Event) -> WrittenFields {
        let notes = event.notes.as_deref()
            .map(signature::strip)
            .filter(|notes| notes.is_empty() == false)
            .map(|notes| notes.to_string());

        let (due, shift) = if event.is_all_day {
            (event.start, 0)
        } else {
            (event.end, TIMED_EVENT_LENGTH_SECS)
        };
        let mut reminders: Vec<i64> = event.alarms.iter().map(|offset| offset - shift).collect();
        reminders.sort_unstable();

        WrittenFields {
            title: event.title.clone(),
            notes,
            due,
            is_all_day: event.is_all_day,
            reminders,
        }
    }

    /// Detect the edits the user has made to a calendar event, and turn them into a patch of its task.
    ///
    /// Returns `Ok(None)` for events we do not manage, and for events that have not been modified since we last wrote them.
    /// `baseline` is what we last wrote into this event. When it is known, only the fields that changed since are patched.
    /// Returns [`SyncError::InvalidTaskId`](crate::error::SyncError::InvalidTaskId) in case the identity marker of the event is malformed.
    pub fn extract_edits(event: &Event, baseline: Option<&WrittenFields>) -> Result<Option<TaskPatch>> {
        let marker = match &event.url {
            Some(url) if IdentityMarker::is_ours(url) => IdentityMarker::parse(url)?,
            _ => return Ok(None),
        };

        if Self::is_modified(event) == false {
            // This is our own write
            return Ok(None);
        }

        let current = Self::fields(event);
        let mut patch = TaskPatch::new(marker.task_id, marker.project_id);
        match baseline {
            None => {
                patch.title = Some(current.title);
                patch.notes = Some(current.notes);
                patch.due = Some(current.due);
                patch.is_all_day = Some(current.is_all_day);
                patch.reminders = Some(current.reminders);
            },
            Some(base) => {
                if current.title != base.title {
                    patch.title = Some(current.title);
                }
                if current.notes != base.notes {
                    patch.notes = Some(current.notes);
                }
                if current.due != base.due || current.is_all_day != base.is_all_day {
                    patch.due = Some(current.due);
                    patch.is_all_day = Some(current.is_all_day);
                }
                let mut base_reminders = base.reminders.clone();
                base_reminders.sort_unstable();
                if current.reminders != base_reminders {
                    patch.reminders = Some(current.reminders);
                }
            },
        }

        if patch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(patch))
        }
    }

    fn signature_of(event: &Event) -> String {
        signature::compute(
            &event.title,
            event.start,
            event.end,
            event.is_all_day,
            &event.alarms,
            event.notes.as_deref(),
        )
    }
}
