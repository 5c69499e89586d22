//! This module provides ways to tweak the in-memory collaborators, so that they can return errors on some tests

use crate::error::{Result, SyncError};

/// This stores some behaviour tweaks, that describe how a mocked instance will behave during a given test
///
/// So that a functions fails _n_ times after _m_ initial successes, set `(m, n)` for the suited parameter
#[derive(Default, Clone, Debug)]
pub struct MockBehaviour {
    /// If this is true, every action will be allowed
    pub is_suspended: bool,

    // From the TaskService trait
    pub fetch_tasks_behaviour: (u32, u32),
    pub patch_task_behaviour: (u32, u32),

    // From the CalendarStore trait
    pub find_or_create_calendar_behaviour: (u32, u32),
    pub events_behaviour: (u32, u32),
    pub create_event_behaviour: (u32, u32),
    pub update_event_behaviour: (u32, u32),
    pub delete_event_behaviour: (u32, u32),
    pub delete_calendar_behaviour: (u32, u32),
    pub commit_behaviour: (u32, u32),
}

impl MockBehaviour {
    pub fn new() -> Self {
        Self::default()
    }

    /// All items will fail at once, for `n_fails` times
    pub fn fail_now(n_fails: u32) -> Self {
        Self {
            is_suspended: false,
            fetch_tasks_behaviour: (0, n_fails),
            patch_task_behaviour: (0, n_fails),
            find_or_create_calendar_behaviour: (0, n_fails),
            events_behaviour: (0, n_fails),
            create_event_behaviour: (0, n_fails),
            update_event_behaviour: (0, n_fails),
            delete_event_behaviour: (0, n_fails),
            delete_calendar_behaviour: (0, n_fails),
            commit_behaviour: (0, n_fails),
        }
    }

    /// Suspend this mock behaviour until you call `resume`
    pub fn suspend(&mut self) {
        self.is_suspended = true;
    }
    /// Make this behaviour active again
    pub fn resume(&mut self) {
        self.is_suspended = false;
    }

    pub fn can_fetch_tasks(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.fetch_tasks_behaviour, "fetch_tasks")
    }
    pub fn can_patch_task(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.patch_task_behaviour, "patch_task")
    }
    pub fn can_find_or_create_calendar(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.find_or_create_calendar_behaviour, "find_or_create_calendar")
    }
    pub fn can_list_events(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.events_behaviour, "events")
    }
    pub fn can_create_event(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.create_event_behaviour, "create_event")
    }
    pub fn can_update_event(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.update_event_behaviour, "update_event")
    }
    pub fn can_delete_event(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.delete_event_behaviour, "delete_event")
    }
    pub fn can_delete_calendar(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.delete_calendar_behaviour, "delete_calendar")
    }
    pub fn can_commit(&mut self) -> Result<()> {
        if self.is_suspended { return Ok(()) }
        decrement(&mut self.commit_behaviour, "commit")
    }
}


/// Return Ok(()) in case the value is `(1+, _)` or `(_, 0)`, or return Err and decrement otherwise
fn decrement(value: &mut (u32, u32), descr: &str) -> Result<()> {
    let remaining_successes = value.0;
    let remaining_failures = value.1;

    if remaining_successes > 0 {
        value.0 = value.0 - 1;
        log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
        Ok(())
    } else {
        if remaining_failures > 0 {
            value.1 = value.1 - 1;
            log::debug!("Mock behaviour: failing a {} ({:?})", descr, value);
            Err(SyncError::TransportError(format!("Mocked behaviour requires this {} to fail this time. ({:?})", descr, value)))
        } else {
            log::debug!("Mock behaviour: allowing a {} ({:?})", descr, value);
            Ok(())
        }
    }
}
