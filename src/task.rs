//! Tasks, as owned by the remote Task Service

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::ids::{ProjectId, TaskId};

/// A project, i.e. a list of tasks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
}

impl Project {
    pub fn new<I: Into<ProjectId>, S: Into<String>>(id: I, title: S) -> Self {
        Self { id: id.into(), title: title.into() }
    }
}

/// A snapshot of a remote to-do task
///
/// Tasks are only created and modified by the Task Service. This crate reads them, and sends [`TaskPatch`]es.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    project_id: ProjectId,
    title: String,
    notes: Option<String>,
    due: Option<DateTime<Utc>>,
    is_all_day: bool,
    /// Offsets of the reminders, in seconds, relative to the due date (negative values are before the due date)
    reminders: Vec<i64>,
    updated_at: DateTime<Utc>,
    /// Whether this task has been deleted or completed
    is_done: bool,
}

impl Task {
    /// Create an undated, not-done task
    pub fn new<I, P, S>(id: I, project_id: P, title: S, updated_at: DateTime<Utc>) -> Self
    where
        I: Into<TaskId>,
        P: Into<ProjectId>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: title.into(),
            notes: None,
            due: None,
            is_all_day: false,
            reminders: Vec::new(),
            updated_at,
            is_done: false,
        }
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>, is_all_day: bool) -> Self {
        self.due = Some(due);
        self.is_all_day = is_all_day;
        self
    }

    pub fn with_reminders(mut self, reminders: Vec<i64>) -> Self {
        self.reminders = reminders;
        self
    }

    pub fn with_done(mut self, is_done: bool) -> Self {
        self.is_done = is_done;
        self
    }

    pub fn id(&self) -> &TaskId                 { &self.id          }
    pub fn project_id(&self) -> &ProjectId      { &self.project_id  }
    pub fn title(&self) -> &str                 { &self.title       }
    pub fn notes(&self) -> Option<&str>         { self.notes.as_deref() }
    pub fn due(&self) -> Option<DateTime<Utc>>  { self.due          }
    pub fn is_all_day(&self) -> bool            { self.is_all_day   }
    pub fn reminders(&self) -> &[i64]           { &self.reminders   }
    pub fn updated_at(&self) -> DateTime<Utc>   { self.updated_at   }
    pub fn is_done(&self) -> bool               { self.is_done      }

    /// Returns a copy of this task with `patch` applied, and a new update timestamp
    pub fn patched(&self, patch: &TaskPatch, updated_at: DateTime<Utc>) -> Self {
        let mut new = self.clone();
        if let Some(title) = &patch.title {
            new.title = title.clone();
        }
        if let Some(notes) = &patch.notes {
            new.notes = notes.clone();
        }
        if let Some(due) = patch.due {
            new.due = Some(due);
        }
        if let Some(is_all_day) = patch.is_all_day {
            new.is_all_day = is_all_day;
        }
        if let Some(reminders) = &patch.reminders {
            new.reminders = reminders.clone();
        }
        new.updated_at = updated_at;
        new
    }
}

/// A partial update of a task, built from edits made in the calendar
///
/// `None` fields are left untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub title: Option<String>,
    /// `Some(None)` clears the notes
    pub notes: Option<Option<String>>,
    pub due: Option<DateTime<Utc>>,
    pub is_all_day: Option<bool>,
    /// Reminder offsets, relative to the due date
    pub reminders: Option<Vec<i64>>,
}

impl TaskPatch {
    pub fn new(task_id: TaskId, project_id: ProjectId) -> Self {
        Self {
            task_id,
            project_id,
            title: None,
            notes: None,
            due: None,
            is_all_day: None,
            reminders: None,
        }
    }

    /// Whether this patch would change nothing
    pub fn is_empty(&self) -> bool {
           self.title.is_none()
        && self.notes.is_none()
        && self.due.is_none()
        && self.is_all_day.is_none()
        && self.reminders.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn patch_only_touches_given_fields() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let task = Task::new("1", "p", "Old", t0)
            .with_notes("some notes")
            .with_due(t0, true)
            .with_reminders(vec![-60]);

        let mut patch = TaskPatch::new(task.id().clone(), task.project_id().clone());
        assert!(patch.is_empty());
        patch.title = Some("New".to_string());
        patch.notes = Some(None);

        let patched = task.patched(&patch, t1);
        assert_eq!(patched.title(), "New");
        assert_eq!(patched.notes(), None);
        assert_eq!(patched.due(), Some(t0));
        assert_eq!(patched.reminders(), &[-60]);
        assert_eq!(patched.updated_at(), t1);
    }
}
