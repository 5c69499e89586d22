//! Errors that can happen while syncing

use thiserror::Error;

/// Everything that can go wrong while syncing tasks and calendar events
///
/// Some of these are fatal to the operation that raised them (e.g. [`SyncError::AccessDenied`] during onboarding),
/// others only concern a single item and are collected during a sync pass.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The user refused to give access to the calendar store
    #[error("access to the calendar store has been denied")]
    AccessDenied,
    /// An identity marker could not be parsed into a task id
    #[error("invalid task identity marker: {0}")]
    InvalidTaskId(String),
    /// The Task Service does not know this task
    #[error("task {0} not found")]
    TaskNotFound(String),
    /// Reserved. Conflicts are currently resolved as last-write-wins.
    #[error("sync conflict")]
    SyncConflict,
    /// A network or service failure
    #[error("transport error: {0}")]
    TransportError(String),
    /// A calendar could not be found or created
    #[error("unable to create calendar: {0}")]
    CalendarCreation(String),
    /// The calendar store does not know this event (anymore)
    #[error("event {0} not found")]
    EventNotFound(String),
    /// Any other failure reported by the calendar store
    #[error("calendar store error: {0}")]
    CalendarStore(String),
    /// The key-value store could not persist the sync state
    #[error("storage error: {0}")]
    Storage(String),
    /// The operation requires sync to be enabled
    #[error("sync is not enabled")]
    NotEnabled,
}

impl SyncError {
    /// Whether this error aborts the whole operation, rather than a single item
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::AccessDenied | SyncError::CalendarCreation(_) | SyncError::NotEnabled)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
