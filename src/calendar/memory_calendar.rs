//! A calendar store that lives in memory
//!
//! This is mostly useful for tests and demos, but it also shows what a [`CalendarStore`] implementor must do.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::calendar::Calendar;
use crate::error::{Result, SyncError};
use crate::event::{Event, TimeRange};
use crate::ids::{CalendarId, EventId, SourceId};
use crate::mock_behaviour::MockBehaviour;
use crate::traits::CalendarStore;

/// A change that has been requested, but not committed yet
#[derive(Clone, Debug)]
enum PendingChange {
    Upsert(Event),
    DeleteEvent(EventId),
    DeleteCalendar(CalendarId),
}

#[derive(Debug, Default)]
struct Inner {
    access_granted: bool,
    sources: Vec<SourceId>,
    calendars: HashMap<CalendarId, Calendar>,
    events: HashMap<EventId, Event>,
    pending: Vec<PendingChange>,
    fixed_now: Option<DateTime<Utc>>,
    mock_behaviour: MockBehaviour,
}

impl Inner {
    fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }

    /// Whether an event exists, taking uncommitted changes into account
    fn has_event(&self, event_id: &EventId) -> bool {
        let mut exists = self.events.contains_key(event_id);
        for change in &self.pending {
            match change {
                PendingChange::Upsert(ev) if ev.id.as_ref() == Some(event_id) => exists = true,
                PendingChange::DeleteEvent(id) if id == event_id => exists = false,
                _ => {},
            }
        }
        exists
    }
}

/// An in-memory [`CalendarStore`]
///
/// Writes are batched until [`CalendarStore::commit`] is called. Edits made "by the user" (see [`MemoryCalendarStore::edit_event`]) are applied immediately.
#[derive(Debug)]
pub struct MemoryCalendarStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryCalendarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCalendarStore {
    /// Create a store with a single writable source named `local`, that grants access
    pub fn new() -> Self {
        let inner = Inner {
            access_granted: true,
            sources: vec![SourceId::from("local")],
            ..Inner::default()
        };
        Self { inner: Mutex::new(inner) }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_access_granted(&self, granted: bool) {
        self.inner().access_granted = granted;
    }

    pub fn set_sources(&self, sources: Vec<SourceId>) {
        self.inner().sources = sources;
    }

    pub fn set_mock_behaviour(&self, behaviour: MockBehaviour) {
        self.inner().mock_behaviour = behaviour;
    }

    /// Use a fixed "now" to stamp modification dates, instead of the system time
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.inner().fixed_now = Some(now);
    }

    pub fn calendars(&self) -> Vec<Calendar> {
        self.inner().calendars.values().cloned().collect()
    }

    /// Every committed event
    pub fn all_events(&self) -> Vec<Event> {
        self.inner().events.values().cloned().collect()
    }

    pub fn event(&self, event_id: &EventId) -> Option<Event> {
        self.inner().events.get(event_id).cloned()
    }

    /// Returns the committed events whose identity marker is `url`
    pub fn events_with_url(&self, url: &str) -> Vec<Event> {
        self.inner().events.values()
            .filter(|ev| ev.url.as_deref() == Some(url))
            .cloned()
            .collect()
    }

    /// Simulate an edit made by the user in their calendar app. This is applied immediately.
    pub fn edit_event<F: FnOnce(&mut Event)>(&self, event_id: &EventId, edit: F) -> Result<()> {
        let mut inner = self.inner();
        let now = inner.now();
        let event = inner.events.get_mut(event_id)
            .ok_or_else(|| SyncError::CalendarStore(format!("No event {}", event_id)))?;
        edit(event);
        event.last_modified = now;
        Ok(())
    }

    /// Simulate an event the user has created in their calendar app. This is applied immediately.
    pub fn add_user_event(&self, mut event: Event) -> EventId {
        let mut inner = self.inner();
        let id = EventId::random();
        event.id = Some(id.clone());
        event.last_modified = inner.now();
        inner.events.insert(id.clone(), event);
        id
    }

    /// Simulate the store invalidating an event handle: the event is kept, but under a brand new id
    pub fn reassign_event_id(&self, event_id: &EventId) -> Option<EventId> {
        let mut inner = self.inner();
        let mut event = inner.events.remove(event_id)?;
        let new_id = EventId::random();
        event.id = Some(new_id.clone());
        inner.events.insert(new_id.clone(), event);
        Some(new_id)
    }

    /// How many changes are waiting for a commit
    pub fn pending_changes(&self) -> usize {
        self.inner().pending.len()
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn request_access(&self) -> Result<bool> {
        Ok(self.inner().access_granted)
    }

    async fn writable_sources(&self) -> Result<Vec<SourceId>> {
        Ok(self.inner().sources.clone())
    }

    async fn find_or_create_calendar(&self, source: &SourceId, name: &str) -> Result<CalendarId> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_find_or_create_calendar()
            .map_err(|err| SyncError::CalendarCreation(err.to_string()))?;

        if inner.sources.contains(source) == false {
            return Err(SyncError::CalendarCreation(format!("No such source {}", source)));
        }

        let existing = inner.calendars.values()
            .find(|cal| cal.source() == source && cal.name() == name)
            .map(|cal| cal.id().clone());
        if let Some(id) = existing {
            return Ok(id);
        }

        let id = CalendarId::random();
        log::debug!("Creating calendar {} ({}) in {}", name, id, source);
        inner.calendars.insert(id.clone(), Calendar::new(id.clone(), name.to_string(), source.clone()));
        Ok(id)
    }

    async fn events(&self, calendar_ids: &[CalendarId], range: TimeRange) -> Result<Vec<Event>> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_list_events()?;

        Ok(inner.events.values()
            .filter(|ev| calendar_ids.contains(&ev.calendar_id))
            .filter(|ev| range.overlaps(ev.start, ev.end))
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: &Event) -> Result<EventId> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_create_event()?;

        if inner.calendars.contains_key(&event.calendar_id) == false {
            return Err(SyncError::CalendarStore(format!("No such calendar {}", event.calendar_id)));
        }
        let id = EventId::random();
        let mut new_event = event.clone();
        new_event.id = Some(id.clone());
        inner.pending.push(PendingChange::Upsert(new_event));
        Ok(id)
    }

    async fn update_event(&self, event: &Event) -> Result<()> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_update_event()?;

        let id = event.id.as_ref()
            .ok_or_else(|| SyncError::CalendarStore("Cannot update an event without id".to_string()))?;
        if inner.has_event(id) == false {
            return Err(SyncError::EventNotFound(id.to_string()));
        }
        inner.pending.push(PendingChange::Upsert(event.clone()));
        Ok(())
    }

    async fn delete_event(&self, event_id: &EventId) -> Result<()> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_delete_event()?;

        if inner.has_event(event_id) == false {
            return Err(SyncError::EventNotFound(event_id.to_string()));
        }
        inner.pending.push(PendingChange::DeleteEvent(event_id.clone()));
        Ok(())
    }

    async fn delete_calendar(&self, calendar_id: &CalendarId) -> Result<()> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_delete_calendar()?;

        if inner.calendars.contains_key(calendar_id) == false {
            return Err(SyncError::CalendarStore(format!("No such calendar {}", calendar_id)));
        }
        inner.pending.push(PendingChange::DeleteCalendar(calendar_id.clone()));
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut inner = self.inner();
        inner.mock_behaviour.can_commit()?;

        let now = inner.now();
        let pending: Vec<PendingChange> = inner.pending.drain(..).collect();
        log::trace!("Committing {} changes", pending.len());
        for change in pending {
            match change {
                PendingChange::Upsert(mut event) => {
                    if let Some(id) = event.id.clone() {
                        event.last_modified = now;
                        inner.events.insert(id, event);
                    }
                },
                PendingChange::DeleteEvent(id) => {
                    inner.events.remove(&id);
                },
                PendingChange::DeleteCalendar(calendar_id) => {
                    inner.events.retain(|_, ev| ev.calendar_id != calendar_id);
                    inner.calendars.remove(&calendar_id);
                },
            }
        }
        Ok(())
    }
}
