//! Contracts of the external collaborators of the sync engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::{Event, TimeRange};
use crate::ids::{CalendarId, EventId, ProjectId, SourceId};
use crate::task::{Task, TaskPatch};

/// The remote service that owns the tasks
///
/// Implementors usually wrap an authenticated HTTP client.
#[async_trait]
pub trait TaskService {
    /// Returns the tasks of the given projects that have been updated after `updated_since` (or every task if `None`),
    /// restricted to the ones that matter in `window`.
    ///
    /// Deleted and completed tasks must be returned as well (see [`Task::is_done`]), so that their events can be removed.
    async fn fetch_tasks(&self, updated_since: Option<DateTime<Utc>>, project_ids: &[ProjectId], window: TimeRange) -> Result<Vec<Task>>;

    /// Apply a partial update to a task. Returns the updated task.
    async fn patch_task(&self, patch: &TaskPatch) -> Result<Task>;
}

/// The native calendar store
///
/// Changes made by `create_event`, `update_event`, `delete_event` and `delete_calendar` may be batched by the store until `commit` is called.
#[async_trait]
pub trait CalendarStore {
    /// Ask the user for access to their calendars. Returns whether access is granted.
    async fn request_access(&self) -> Result<bool>;

    /// The sources (accounts) calendars can be created in
    async fn writable_sources(&self) -> Result<Vec<SourceId>>;

    /// Returns the id of the calendar with this name in `source`, after creating it if needed
    async fn find_or_create_calendar(&self, source: &SourceId, name: &str) -> Result<CalendarId>;

    /// Returns the events of the given calendars that overlap `range`
    async fn events(&self, calendar_ids: &[CalendarId], range: TimeRange) -> Result<Vec<Event>>;

    /// Create an event into `event.calendar_id`. Returns the id of the new event.
    async fn create_event(&self, event: &Event) -> Result<EventId>;

    /// Overwrite an existing event. `event.id` must be set.
    ///
    /// Implementors return [`SyncError::EventNotFound`](crate::SyncError::EventNotFound) when the event does not exist.
    async fn update_event(&self, event: &Event) -> Result<()>;

    /// Implementors return [`SyncError::EventNotFound`](crate::SyncError::EventNotFound) when the event does not exist.
    async fn delete_event(&self, event_id: &EventId) -> Result<()>;

    /// Delete a calendar, and every event it contains
    async fn delete_calendar(&self, calendar_id: &CalendarId) -> Result<()>;

    /// Apply every pending change
    async fn commit(&self) -> Result<()>;
}

/// A durable key-value storage
pub trait KeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}
