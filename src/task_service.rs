//! A Task Service that lives in memory
//!
//! Real implementors of [`TaskService`] talk to a remote server. This one is used in tests and demos.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::event::TimeRange;
use crate::ids::{ProjectId, TaskId};
use crate::mock_behaviour::MockBehaviour;
use crate::task::{Task, TaskPatch};
use crate::traits::TaskService;

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    received_patches: Vec<TaskPatch>,
    failing_projects: HashSet<ProjectId>,
    fetch_count: usize,
    fixed_now: Option<DateTime<Utc>>,
    mock_behaviour: MockBehaviour,
}

/// An in-memory [`TaskService`]. Patches are applied with a last-write-wins policy.
#[derive(Debug, Default)]
pub struct MemoryTaskService {
    inner: Mutex<Inner>,
}

impl MemoryTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace a task, as if it had been modified remotely
    pub fn upsert_task(&self, task: Task) {
        self.inner().tasks.insert(task.id().clone(), task);
    }

    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.inner().tasks.get(task_id).cloned()
    }

    /// Every patch this service has successfully applied
    pub fn received_patches(&self) -> Vec<TaskPatch> {
        self.inner().received_patches.clone()
    }

    /// How many times `fetch_tasks` has been called
    pub fn fetch_count(&self) -> usize {
        self.inner().fetch_count
    }

    /// Make every fetch that includes this project fail
    pub fn set_project_failing(&self, project_id: ProjectId, failing: bool) {
        let mut inner = self.inner();
        if failing {
            inner.failing_projects.insert(project_id);
        } else {
            inner.failing_projects.remove(&project_id);
        }
    }

    pub fn set_mock_behaviour(&self, behaviour: MockBehaviour) {
        self.inner().mock_behaviour = behaviour;
    }

    /// Use a fixed "now" to stamp patched tasks, instead of the system time
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.inner().fixed_now = Some(now);
    }
}

#[async_trait]
impl TaskService for MemoryTaskService {
    async fn fetch_tasks(&self, updated_since: Option<DateTime<Utc>>, project_ids: &[ProjectId], window: TimeRange) -> Result<Vec<Task>> {
        let mut inner = self.inner();
        inner.fetch_count += 1;
        inner.mock_behaviour.can_fetch_tasks()?;

        if let Some(failing) = project_ids.iter().find(|id| inner.failing_projects.contains(*id)) {
            return Err(SyncError::TransportError(format!("Unable to fetch project {}", failing)));
        }

        Ok(inner.tasks.values()
            .filter(|task| project_ids.contains(task.project_id()))
            .filter(|task| updated_since.map(|since| task.updated_at() >= since).unwrap_or(true))
            // Done and undated tasks are always returned, so that clients can remove them from their calendars
            .filter(|task| task.is_done() || task.due().map(|due| window.contains(due)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn patch_task(&self, patch: &TaskPatch) -> Result<Task> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_patch_task()?;

        let now = inner.fixed_now.unwrap_or_else(Utc::now);
        let current = inner.tasks.get(&patch.task_id)
            .ok_or_else(|| SyncError::TaskNotFound(patch.task_id.to_string()))?;
        let updated = current.patched(patch, now);

        inner.tasks.insert(updated.id().clone(), updated.clone());
        inner.received_patches.push(patch.clone());
        Ok(updated)
    }
}
