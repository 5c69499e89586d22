//! This crate keeps tasks from a remote Task Service in sync with the events of a native calendar store.
//!
//! Tasks that have a due date are written into calendar events by a _pull_, and the edits the user makes to these events
//! (renaming, moving, changing reminders...) are sent back to the Task Service by a _push_.
//! Both directions are driven by a [`SyncEngine`](engine::SyncEngine).
//!
//! The engine only talks to its collaborators through the traits of the [`traits`] module, so that any Task Service, calendar store or
//! key-value storage can be plugged in. \
//! In-memory implementations are provided (see [`MemoryTaskService`], [`MemoryCalendarStore`] and the [`storage`] module), that are mostly useful for tests and demos.
//!
//! Events that are managed by this crate can be told apart from the other events of the calendar store by their identity marker (see [`identity`]),
//! and the engine can tell its own writes from user edits thanks to a content signature (see [`signature`]).

pub mod error;
pub use error::{Result, SyncError};
pub mod ids;
pub use ids::{CalendarId, EventId, ProjectId, SourceId, TaskId};
pub mod traits;

mod task;
pub use task::{Project, Task, TaskPatch};
mod event;
pub use event::{Event, TimeRange, WrittenFields};

pub mod signature;
pub mod identity;
pub use identity::{IdentityMap, IdentityMarker, ProjectCalendarMap};
pub mod mapper;
pub use mapper::TaskEventMapper;
pub mod state;
pub use state::{CalendarMode, SyncState, SyncStateStore};
pub mod debouncer;
pub use debouncer::Debouncer;
pub mod engine;
pub use engine::{DisableDisposition, EngineState, SyncDirection, SyncEngine, SyncReport};

pub mod calendar;
pub use calendar::memory_calendar::MemoryCalendarStore;
pub mod task_service;
pub use task_service::MemoryTaskService;
pub mod storage;

pub mod config;
pub use config::SyncSettings;
pub mod mock_behaviour;
pub mod utils;
