//! This module keeps a Task Service and a calendar store in sync
//!
//! A [`SyncEngine`] runs two kinds of passes:
//! * a _pull_ writes the tasks that have been updated remotely into calendar events,
//! * a _push_ turns the edits the user made to these events into task patches.
//!
//! Every event written by a pull carries a signature of its content, so that a push can tell the engine's own writes from the user's edits.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Months, Utc};
use futures::future::join_all;

use crate::config::{self, SyncSettings};
use crate::debouncer::Debouncer;
use crate::error::{Result, SyncError};
use crate::event::{Event, TimeRange};
use crate::identity::{IdentityMap, IdentityMarker, ProjectCalendarMap};
use crate::ids::{CalendarId, EventId, ProjectId, TaskId};
use crate::mapper::TaskEventMapper;
use crate::state::{CalendarMode, SyncSetup, SyncState, SyncStateStore};
use crate::task::{Project, Task};
use crate::traits::{CalendarStore, KeyValueStore, TaskService};

pub mod sync_progress;
use sync_progress::SyncProgress;
use sync_progress::{FeedbackSender, SyncEvent};
pub use sync_progress::SyncDirection;

/// Where an engine stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Sync is not set up
    Disabled,
    /// The user is choosing how their tasks should be synced
    Onboarding,
    /// Sync is enabled, and no pass is running
    Idle,
    /// A pass is running
    Syncing(SyncDirection),
    /// Onboarding has failed. See [`SyncEngine::errors`]
    Error,
}

/// What should happen to the calendars the engine manages when sync is disabled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisableDisposition {
    KeepEverything,
    DeleteManagedEvents,
}

/// The outcome of a sync pass
#[derive(Clone, Debug, PartialEq)]
pub struct SyncReport {
    pub direction: SyncDirection,
    /// The pass did not run, because another pass in the same direction was already running
    pub skipped: bool,
    /// How many tasks (for a pull) or events (for a push) have been examined
    pub processed: usize,
    /// How many events (for a pull) or tasks (for a push) have been written
    pub written: usize,
    /// The most recent per-item errors of this pass
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    fn new(direction: SyncDirection) -> Self {
        Self { direction, skipped: false, processed: 0, written: 0, errors: Vec::new() }
    }

    fn skipped(direction: SyncDirection) -> Self {
        Self { skipped: true, ..Self::new(direction) }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Disabled,
    Onboarding,
    Enabled,
    Failed,
}

/// Everything the engine mutates. This is only ever locked for short, synchronous sections.
#[derive(Debug)]
struct EngineData {
    lifecycle: Lifecycle,
    setup: SyncSetup,
    identity_map: IdentityMap,
    project_calendars: ProjectCalendarMap,
    sync_state: SyncState,
    errors: VecDeque<SyncError>,
}

/// Sets a flag for as long as it lives, even if the pass it guards is cancelled
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl<'a> Drop for RunningFlag<'a> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The calendar events that already exist in the managed calendars, indexed for a pull
struct ManagedEvents {
    by_event_id: HashMap<EventId, Event>,
    by_task_id: HashMap<TaskId, EventId>,
}

impl ManagedEvents {
    fn new(events: Vec<Event>) -> Self {
        let mut by_event_id = HashMap::new();
        let mut by_task_id = HashMap::new();
        for event in events {
            let event_id = match &event.id {
                None => continue,
                Some(id) => id.clone(),
            };
            let marker = event.url.as_deref()
                .filter(|url| IdentityMarker::is_ours(url))
                .and_then(|url| IdentityMarker::parse(url).ok());
            if let Some(marker) = marker {
                by_task_id.insert(marker.task_id, event_id.clone());
            }
            by_event_id.insert(event_id, event);
        }
        Self { by_event_id, by_task_id }
    }

    /// Find the event of a task, first from its known id, then from its identity marker
    fn resolve(&self, known_event: Option<&EventId>, task_id: &TaskId) -> Option<&Event> {
        known_event
            .and_then(|id| self.by_event_id.get(id))
            .or_else(|| self.by_task_id.get(task_id).and_then(|id| self.by_event_id.get(id)))
    }
}


/// Keeps the tasks of a [`TaskService`] and the events of a [`CalendarStore`] in sync
///
/// Every method takes `&self`, so that an engine can be shared (e.g. in an `Arc`) between the UI and the calendar change notifications.
/// At most one pass per direction runs at any time: a pass that is requested while another one in the same direction is running is ignored.
pub struct SyncEngine<T, C, K>
where
    T: TaskService + Send + Sync,
    C: CalendarStore + Send + Sync,
    K: KeyValueStore,
{
    tasks: Arc<T>,
    calendar: Arc<C>,
    store: SyncStateStore<K>,
    settings: SyncSettings,

    data: Mutex<EngineData>,
    pull_guard: tokio::sync::Mutex<()>,
    push_guard: tokio::sync::Mutex<()>,
    pull_running: AtomicBool,
    push_running: AtomicBool,
    debouncer: Debouncer,
}

impl<T, C, K> SyncEngine<T, C, K>
where
    T: TaskService + Send + Sync,
    C: CalendarStore + Send + Sync,
    K: KeyValueStore,
{
    /// Create an engine, and restore what has been persisted by a previous one (if any)
    pub fn new(tasks: Arc<T>, calendar: Arc<C>, store: SyncStateStore<K>, settings: SyncSettings) -> Self {
        let setup = store.load_setup();
        let lifecycle = if setup.enabled { Lifecycle::Enabled } else { Lifecycle::Disabled };
        let data = EngineData {
            lifecycle,
            identity_map: store.load_identity_map(),
            project_calendars: store.load_project_calendars(),
            sync_state: store.load_state(),
            setup,
            errors: VecDeque::new(),
        };
        log::debug!("Creating a sync engine ({:?})", lifecycle);

        Self {
            tasks,
            calendar,
            store,
            debouncer: Debouncer::new(settings.debounce_interval()),
            settings,
            data: Mutex::new(data),
            pull_guard: tokio::sync::Mutex::new(()),
            push_guard: tokio::sync::Mutex::new(()),
            pull_running: AtomicBool::new(false),
            push_running: AtomicBool::new(false),
        }
    }

    fn data(&self) -> MutexGuard<'_, EngineData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn task_service(&self) -> &Arc<T>           { &self.tasks    }
    pub fn calendar_store(&self) -> &Arc<C>         { &self.calendar }
    pub fn settings(&self) -> &SyncSettings         { &self.settings }

    pub fn state(&self) -> EngineState {
        match self.data().lifecycle {
            Lifecycle::Disabled => EngineState::Disabled,
            Lifecycle::Onboarding => EngineState::Onboarding,
            Lifecycle::Failed => EngineState::Error,
            Lifecycle::Enabled => {
                if self.pull_running.load(Ordering::SeqCst) {
                    EngineState::Syncing(SyncDirection::Pull)
                } else if self.push_running.load(Ordering::SeqCst) {
                    EngineState::Syncing(SyncDirection::Push)
                } else {
                    EngineState::Idle
                }
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.data().lifecycle == Lifecycle::Enabled
    }

    /// The most recent errors, oldest first
    pub fn errors(&self) -> Vec<SyncError> {
        self.data().errors.iter().cloned().collect()
    }

    pub fn clear_errors(&self) {
        self.data().errors.clear();
    }

    pub fn sync_state(&self) -> SyncState {
        self.data().sync_state
    }

    pub fn setup(&self) -> SyncSetup {
        self.data().setup.clone()
    }

    /// A snapshot of the task/event associations
    pub fn identity_map(&self) -> IdentityMap {
        self.data().identity_map.clone()
    }

    /// A snapshot of the project/calendar associations (only used in [`CalendarMode::PerProject`])
    pub fn project_calendars(&self) -> ProjectCalendarMap {
        self.data().project_calendars.clone()
    }

    fn record_errors<I: IntoIterator<Item = SyncError>>(&self, errors: I) {
        let max_errors = self.settings.max_errors;
        let mut data = self.data();
        for err in errors {
            if max_errors == 0 {
                break;
            }
            while data.errors.len() >= max_errors {
                data.errors.pop_front();
            }
            data.errors.push_back(err);
        }
    }



    /// Start onboarding. Persisted sync settings are left untouched until [`Self::onboarding_complete`] succeeds.
    pub fn onboarding_begin(&self) {
        let mut data = self.data();
        data.errors.clear();
        data.lifecycle = Lifecycle::Onboarding;
        log::info!("Sync onboarding has started");
    }

    /// Finish onboarding: get access to the calendar store, set up the calendars and enable sync
    ///
    /// Re-running this with the same choices re-uses the calendars that already exist.
    pub async fn onboarding_complete(&self, mode: CalendarMode, projects: Vec<Project>) -> Result<()> {
        match self.set_up_calendars(mode, projects).await {
            Ok(()) => {
                log::info!("Sync is now enabled");
                Ok(())
            },
            Err(err) => {
                log::error!("Unable to complete onboarding: {}", err);
                {
                    let mut data = self.data();
                    // An engine that was already enabled keeps syncing with its previous setup, just like it would after a restart
                    data.lifecycle = if data.setup.enabled { Lifecycle::Enabled } else { Lifecycle::Failed };
                }
                self.record_errors(vec![err.clone()]);
                Err(err)
            },
        }
    }

    async fn set_up_calendars(&self, mode: CalendarMode, projects: Vec<Project>) -> Result<()> {
        if self.calendar.request_access().await? == false {
            return Err(SyncError::AccessDenied);
        }

        let source = self.calendar.writable_sources().await?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::CalendarCreation("no writable calendar source".to_string()))?;

        let mut setup = SyncSetup {
            enabled: true,
            mode,
            projects: projects.clone(),
            calendar_id: None,
        };
        let mut project_calendars = ProjectCalendarMap::new();
        match mode {
            CalendarMode::Single => {
                let name = config::single_calendar_name();
                let calendar_id = self.calendar.find_or_create_calendar(&source, &name).await
                    .map_err(as_calendar_creation)?;
                log::debug!("Tasks will be synced into calendar {} ({})", name, calendar_id);
                setup.calendar_id = Some(calendar_id);
            },
            CalendarMode::PerProject => {
                for project in projects {
                    let name = config::project_calendar_name(&project.title);
                    let calendar_id = self.calendar.find_or_create_calendar(&source, &name).await
                        .map_err(as_calendar_creation)?;
                    log::debug!("Project {} will be synced into calendar {} ({})", project.id, name, calendar_id);
                    project_calendars.add_mapping(project.id, calendar_id);
                }
            },
        }

        // Cursors are reset, so that the next pull fetches everything in the new calendars
        let sync_state = SyncState::default();
        self.store.save_setup(&setup)?;
        self.store.save_project_calendars(&project_calendars)?;
        self.store.save_state(&sync_state)?;

        let mut data = self.data();
        data.lifecycle = Lifecycle::Enabled;
        data.setup = setup;
        data.project_calendars = project_calendars;
        data.sync_state = sync_state;
        Ok(())
    }

    /// Stop syncing, and forget everything that has been persisted
    ///
    /// With [`DisableDisposition::DeleteManagedEvents`], the calendars this engine manages are deleted (along with their events) first.
    /// Failures to delete them are recorded in [`Self::errors`], but do not prevent sync from being disabled.
    pub async fn disable_sync(&self, disposition: DisableDisposition) -> Result<()> {
        self.debouncer.cancel();

        if disposition == DisableDisposition::DeleteManagedEvents {
            let calendars = {
                let data = self.data();
                managed_calendars(&data.setup, &data.project_calendars)
            };
            let mut errors = Vec::new();
            for calendar_id in calendars {
                log::debug!("Deleting calendar {}", calendar_id);
                if let Err(err) = self.calendar.delete_calendar(&calendar_id).await {
                    log::warn!("Unable to delete calendar {}: {}", calendar_id, err);
                    errors.push(err);
                }
            }
            if let Err(err) = self.calendar.commit().await {
                log::warn!("Unable to commit the deletion of the calendars: {}", err);
                errors.push(err);
            }
            self.record_errors(errors);
        }

        {
            let mut data = self.data();
            data.lifecycle = Lifecycle::Disabled;
            data.setup = SyncSetup::default();
            data.identity_map = IdentityMap::new();
            data.project_calendars = ProjectCalendarMap::new();
            data.sync_state = SyncState::default();
        }
        log::info!("Sync is now disabled");
        self.store.clear()
    }



    /// Write the tasks that have changed remotely into the calendar, and provide feedback to the user about the progress.
    ///
    /// See [`Self::pull_sync`]
    pub async fn pull_sync_with_feedback(&self, feedback_sender: FeedbackSender) -> Result<SyncReport> {
        let mut progress = SyncProgress::new_with_feedback_channel(self.settings.max_errors, feedback_sender);
        self.run_pull(Utc::now(), &mut progress).await
    }

    /// Write the tasks that have changed remotely into the calendar
    ///
    /// Per-item failures do not stop the pass: they are listed in the returned report (and in [`Self::errors`]).
    /// Simply run this function again, it will pick up where it failed.
    pub async fn pull_sync(&self) -> Result<SyncReport> {
        self.pull_sync_at(Utc::now()).await
    }

    /// Same as [`Self::pull_sync`], with the rolling window centered on `now`
    pub async fn pull_sync_at(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        let mut progress = SyncProgress::new(self.settings.max_errors);
        self.run_pull(now, &mut progress).await
    }

    /// Turn the edits the user made to the managed events into task patches
    pub async fn push_sync(&self) -> Result<SyncReport> {
        self.push_sync_at(Utc::now()).await
    }

    /// Same as [`Self::push_sync`], with the scan window centered on `now`
    pub async fn push_sync_at(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        let mut progress = SyncProgress::new(self.settings.max_errors);
        self.run_push(now, &mut progress).await
    }

    /// Tasks due in this range are written into the calendar
    pub fn pull_window(&self, now: DateTime<Utc>) -> TimeRange {
        let start = now - Duration::weeks(self.settings.pull_past_weeks);
        TimeRange::new(start, add_months(now, self.settings.pull_future_months))
    }

    /// Events in this range are scanned for user edits
    pub fn push_window(&self, now: DateTime<Utc>) -> TimeRange {
        let months = self.settings.push_window_months;
        TimeRange::new(sub_months(now, months), add_months(now, months))
    }

    async fn run_pull(&self, now: DateTime<Utc>, progress: &mut SyncProgress) -> Result<SyncReport> {
        let _guard = match self.pull_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                progress.info("A pull is already running. Ignoring this one.");
                return Ok(SyncReport::skipped(SyncDirection::Pull));
            },
        };
        if self.is_enabled() == false {
            return Err(SyncError::NotEnabled);
        }
        let _running = RunningFlag::raise(&self.pull_running);

        let mut report = SyncReport::new(SyncDirection::Pull);
        let completed = self.run_pull_inner(now, progress, &mut report).await;
        progress.feedback(SyncEvent::Finished{ direction: SyncDirection::Pull, success: progress.is_success() });
        progress.info(&format!("Pull ended ({} tasks, {} events written, {} errors)", report.processed, report.written, progress.n_errors()));

        if completed == false {
            log::debug!("The remote cursor has not been moved");
        }
        self.persist(progress);

        report.errors = progress.errors().cloned().collect();
        self.record_errors(report.errors.clone());
        Ok(report)
    }

    /// Returns whether the remote cursor could be moved forward
    async fn run_pull_inner(&self, now: DateTime<Utc>, progress: &mut SyncProgress, report: &mut SyncReport) -> bool {
        progress.info("Starting a pull.");
        progress.feedback(SyncEvent::Started{ direction: SyncDirection::Pull });

        let (setup, project_calendars, cursor) = {
            let data = self.data();
            (data.setup.clone(), data.project_calendars.clone(), data.sync_state.remote_cursor)
        };
        let window = self.pull_window(now);

        // Step 1 - fetch the tasks of every project
        let project_ids: Vec<ProjectId> = setup.projects.iter().map(|project| project.id.clone()).collect();
        let fetches = project_ids.iter().map(|project_id| async move {
            let result = self.tasks.fetch_tasks(cursor, std::slice::from_ref(project_id), window).await;
            (project_id, result)
        });

        let mut all_fetched = true;
        let mut tasks = Vec::new();
        for (project_id, result) in join_all(fetches).await {
            match result {
                Ok(mut project_tasks) => {
                    progress.debug(&format!("Fetched {} tasks from project {}", project_tasks.len(), project_id));
                    tasks.append(&mut project_tasks);
                },
                Err(err) => {
                    all_fetched = false;
                    progress.error(err, &format!("Unable to fetch the tasks of project {}", project_id));
                },
            }
        }
        let newest_update = tasks.iter().map(|task| task.updated_at()).max();

        // Step 2 - find the events that already exist
        let calendars = managed_calendars(&setup, &project_calendars);
        let existing = match self.calendar.events(&calendars, window).await {
            Ok(events) => ManagedEvents::new(events),
            Err(err) => {
                progress.error(err, "Unable to list the managed events");
                return false;
            },
        };

        // Step 3 - write the changes
        progress.reset_counter();
        for task in &tasks {
            progress.trace(&format!("***** Considering task {}...", task.id()));
            progress.increment_counter(1);
            progress.feedback(SyncEvent::InProgress{
                direction: SyncDirection::Pull,
                items_done_already: progress.counter(),
                details: task.title().to_string(),
            });
            report.processed += 1;

            match self.pull_task(task, window, cursor, &setup, &project_calendars, &existing, progress).await {
                Ok(true) => report.written += 1,
                Ok(false) => {},
                Err(err) => progress.error(err, &format!("Unable to sync task {}", task.id())),
            }
        }

        if let Err(err) = self.calendar.commit().await {
            progress.error(err, "Unable to commit the calendar changes");
            return false;
        }

        if all_fetched == false {
            return false;
        }
        if let Some(newest_update) = newest_update {
            self.data().sync_state.advance_remote_cursor(newest_update);
        }
        true
    }

    /// Write a single task into the calendar. Returns whether the calendar has been changed.
    #[allow(clippy::too_many_arguments)]
    async fn pull_task(
        &self,
        task: &Task,
        window: TimeRange,
        cursor: Option<DateTime<Utc>>,
        setup: &SyncSetup,
        project_calendars: &ProjectCalendarMap,
        existing: &ManagedEvents,
        progress: &mut SyncProgress,
    ) -> Result<bool> {
        let known_event = self.data().identity_map.event_for(task.id()).cloned();
        let current = existing.resolve(known_event.as_ref(), task.id());

        let due = match (task.is_done(), task.due()) {
            (false, Some(due)) => due,
            (is_done, _) => {
                // This task must not appear in the calendar (anymore)
                let target = current.and_then(|event| event.id.clone()).or(known_event);
                let event_id = match target {
                    None => return Ok(false),
                    Some(id) => id,
                };
                progress.debug(&format!("> Removing the event of task {} (done: {})", task.id(), is_done));
                let deletion = self.delete_event_if_exists(&event_id, progress).await;
                {
                    let mut data = self.data();
                    data.identity_map.remove_by_task(task.id());
                    data.identity_map.remove_by_event(&event_id);
                }
                deletion?;
                return Ok(true);
            },
        };

        if window.contains(due) == false {
            progress.trace(&format!("Task {} is due outside of the window", task.id()));
            return Ok(false);
        }

        let calendar_id = target_calendar(task, setup, project_calendars)?;

        if let Some(event) = current {
            // Edits the user made to an event must survive until they are pushed, unless the task itself has changed since
            let task_unchanged = cursor.map(|cursor| task.updated_at() <= cursor).unwrap_or(false);
            if task_unchanged && TaskEventMapper::is_modified(event) {
                progress.debug(&format!("Event of task {} has pending user edits, leaving it alone", task.id()));
                return Ok(false);
            }
        }

        let mut event = match current {
            Some(event) => event.clone(),
            None => Event::new(calendar_id.clone()),
        };
        TaskEventMapper::apply(task, &mut event);

        let (event_id, written) = match current {
            Some(previous) if previous.calendar_id != calendar_id => {
                progress.debug(&format!("> Moving the event of task {} to calendar {}", task.id(), calendar_id));
                if let Some(previous_id) = &previous.id {
                    self.delete_event_if_exists(previous_id, progress).await?;
                    self.data().identity_map.remove_by_event(previous_id);
                }
                event.id = None;
                event.calendar_id = calendar_id;
                let new_id = self.calendar.create_event(&event).await?;
                (new_id, true)
            },
            Some(previous) => {
                let event_id = previous.id.clone()
                    .ok_or_else(|| SyncError::CalendarStore(format!("The event of task {} has no id", task.id())))?;
                if event.has_same_content_as(previous) {
                    progress.trace(&format!("Event of task {} is up to date", task.id()));
                    (event_id, false)
                } else {
                    progress.debug(&format!("> Updating the event of task {}", task.id()));
                    self.calendar.update_event(&event).await?;
                    (event_id, true)
                }
            },
            None => {
                if let Some(stale_id) = &known_event {
                    // The mapped event is not in the listing, e.g. because it is older than the window
                    progress.debug(&format!("> Replacing event {} of task {}", stale_id, task.id()));
                    self.delete_event_if_exists(stale_id, progress).await?;
                    self.data().identity_map.remove_by_event(stale_id);
                }
                progress.debug(&format!("> Creating an event for task {}", task.id()));
                let new_id = self.calendar.create_event(&event).await?;
                (new_id, true)
            },
        };

        let mut data = self.data();
        data.identity_map.add_mapping(task.id().clone(), event_id.clone());
        data.identity_map.record_written(event_id, TaskEventMapper::fields(&event));
        Ok(written)
    }

    /// Delete an event. An event that does not exist anymore (e.g. the user has deleted it) counts as deleted.
    async fn delete_event_if_exists(&self, event_id: &EventId, progress: &mut SyncProgress) -> Result<()> {
        match self.calendar.delete_event(event_id).await {
            Err(SyncError::EventNotFound(_)) => {
                progress.debug(&format!("Event {} has already been deleted", event_id));
                Ok(())
            },
            result => result,
        }
    }

    async fn run_push(&self, now: DateTime<Utc>, progress: &mut SyncProgress) -> Result<SyncReport> {
        let _guard = match self.push_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                progress.info("A push is already running. Ignoring this one.");
                return Ok(SyncReport::skipped(SyncDirection::Push));
            },
        };
        if self.is_enabled() == false {
            return Err(SyncError::NotEnabled);
        }
        let _running = RunningFlag::raise(&self.push_running);

        let mut report = SyncReport::new(SyncDirection::Push);
        if self.run_push_inner(now, progress, &mut report).await {
            // This also happens when some patches have failed: these events will only be pushed again after another user edit
            self.data().sync_state.advance_local_scan(now);
        }
        progress.feedback(SyncEvent::Finished{ direction: SyncDirection::Push, success: progress.is_success() });
        progress.info(&format!("Push ended ({} events, {} tasks patched, {} errors)", report.processed, report.written, progress.n_errors()));
        self.persist(progress);

        report.errors = progress.errors().cloned().collect();
        self.record_errors(report.errors.clone());
        Ok(report)
    }

    /// Returns whether the local scan timestamp can be moved forward
    async fn run_push_inner(&self, now: DateTime<Utc>, progress: &mut SyncProgress, report: &mut SyncReport) -> bool {
        progress.info("Starting a push.");
        progress.feedback(SyncEvent::Started{ direction: SyncDirection::Push });

        let (calendars, last_scan) = {
            let data = self.data();
            (managed_calendars(&data.setup, &data.project_calendars), data.sync_state.last_local_scan)
        };

        let events = match self.calendar.events(&calendars, self.push_window(now)).await {
            Ok(events) => events,
            Err(err) => {
                progress.error(err, "Unable to list the managed events");
                return false;
            },
        };

        let candidates = events.into_iter()
            .filter(|event| event.url.as_deref().map(IdentityMarker::is_ours).unwrap_or(false))
            .filter(|event| last_scan.map(|scan| event.last_modified > scan).unwrap_or(true));

        progress.reset_counter();
        for event in candidates {
            progress.trace(&format!("***** Considering event {:?}...", event.id));
            progress.increment_counter(1);
            progress.feedback(SyncEvent::InProgress{
                direction: SyncDirection::Push,
                items_done_already: progress.counter(),
                details: event.title.clone(),
            });
            report.processed += 1;

            let description = event.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
            match self.push_event(event, progress).await {
                Ok(true) => report.written += 1,
                Ok(false) => {},
                Err(err) => progress.error(err, &format!("Unable to push event {}", description)),
            }
        }

        if report.written > 0 {
            if let Err(err) = self.calendar.commit().await {
                progress.error(err, "Unable to commit the re-stamped events");
            }
        }
        true
    }

    /// Push the user edits of a single event. Returns whether a task has been patched.
    async fn push_event(&self, mut event: Event, progress: &mut SyncProgress) -> Result<bool> {
        let event_id = event.id.clone()
            .ok_or_else(|| SyncError::CalendarStore("Cannot push an event without id".to_string()))?;
        let baseline = self.data().identity_map.written(&event_id).cloned();

        let patch = match TaskEventMapper::extract_edits(&event, baseline.as_ref())? {
            None => return Ok(false),
            Some(patch) => patch,
        };

        progress.debug(&format!("> Patching task {} from event {}", patch.task_id, event_id));
        let task = self.tasks.patch_task(&patch).await?;

        // The event now matches the task: sign it, so that the next push does not see it as an edit
        TaskEventMapper::restamp(&mut event);
        self.calendar.update_event(&event).await?;

        let mut data = self.data();
        data.identity_map.add_mapping(task.id().clone(), event_id.clone());
        data.identity_map.record_written(event_id, TaskEventMapper::fields(&event));
        Ok(true)
    }

    /// Save the cursors and the associations
    fn persist(&self, progress: &mut SyncProgress) {
        let (identity_map, sync_state) = {
            let data = self.data();
            (data.identity_map.clone(), data.sync_state)
        };
        if let Err(err) = self.store.save_identity_map(&identity_map) {
            progress.error(err, "Unable to save the identity map");
        }
        if let Err(err) = self.store.save_state(&sync_state) {
            progress.error(err, "Unable to save the sync state");
        }
    }
}

impl<T, C, K> SyncEngine<T, C, K>
where
    T: TaskService + Send + Sync + 'static,
    C: CalendarStore + Send + Sync + 'static,
    K: KeyValueStore + Send + Sync + 'static,
{
    /// Notify the engine that the calendar store has changed
    ///
    /// Bursts of notifications are coalesced into a single push, that starts once no notification has been received for [`SyncSettings::debounce_interval`].
    /// This must be called from within a tokio runtime.
    pub fn trigger_from_local_change(self: &Arc<Self>) {
        if self.is_enabled() == false {
            log::debug!("Ignoring a calendar change, sync is not enabled");
            return;
        }

        let engine = Arc::clone(self);
        self.debouncer.schedule(move || async move {
            match engine.push_sync().await {
                Ok(report) if report.skipped => log::debug!("A push was already running"),
                Ok(report) => log::debug!("Push triggered by a calendar change: {} tasks patched", report.written),
                Err(err) => log::warn!("Unable to push the calendar changes: {}", err),
            }
        });
    }

    /// Whether a push is waiting for calendar changes to settle down
    pub fn has_pending_trigger(&self) -> bool {
        self.debouncer.is_pending()
    }
}


fn as_calendar_creation(err: SyncError) -> SyncError {
    match err {
        SyncError::CalendarCreation(_) => err,
        other => SyncError::CalendarCreation(other.to_string()),
    }
}

/// The calendars that contain the events written by the engine
fn managed_calendars(setup: &SyncSetup, project_calendars: &ProjectCalendarMap) -> Vec<CalendarId> {
    match setup.mode {
        CalendarMode::Single => setup.calendar_id.iter().cloned().collect(),
        CalendarMode::PerProject => project_calendars.calendars().cloned().collect(),
    }
}

/// The calendar a task should be written into
fn target_calendar(task: &Task, setup: &SyncSetup, project_calendars: &ProjectCalendarMap) -> Result<CalendarId> {
    match setup.mode {
        CalendarMode::Single => setup.calendar_id.clone()
            .ok_or_else(|| SyncError::CalendarStore("No calendar has been set up".to_string())),
        CalendarMode::PerProject => project_calendars.lookup(task.project_id()).cloned()
            .ok_or_else(|| SyncError::CalendarStore(format!("No calendar for project {}", task.project_id()))),
    }
}

fn add_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_add_months(Months::new(months))
        .unwrap_or_else(|| date + Duration::days(31 * i64::from(months)))
}

fn sub_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_sub_months(Months::new(months))
        .unwrap_or_else(|| date - Duration::days(31 * i64::from(months)))
}
