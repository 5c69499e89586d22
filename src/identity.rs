//! Associations between tasks and calendar events
//!
//! * [`IdentityMarker`] is embedded into every event we manage, and durably links it to its task
//! * [`IdentityMap`] caches the task id ⇄ event id associations
//! * [`ProjectCalendarMap`] tells which calendar receives the tasks of a project

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

use crate::config::MARKER_SCHEME;
use crate::error::{Result, SyncError};
use crate::event::WrittenFields;
use crate::ids::{CalendarId, EventId, ProjectId, TaskId};

const MARKER_HOST: &str = "task";
const PROJECT_KEY: &str = "project";

/// Links an event to its task, in the form `taskcal://task/<taskId>?project=<projectId>`
///
/// Event ids may be invalidated by the calendar store, this marker is stored inside the event itself and survives restarts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityMarker {
    pub task_id: TaskId,
    pub project_id: ProjectId,
}

impl IdentityMarker {
    pub fn new(task_id: TaskId, project_id: ProjectId) -> Self {
        Self { task_id, project_id }
    }

    /// Whether this string uses our marker scheme (which does not mean it is valid)
    pub fn is_ours(marker: &str) -> bool {
        marker.strip_prefix(MARKER_SCHEME)
            .map(|rest| rest.starts_with("://"))
            .unwrap_or(false)
    }

    /// Parse a marker. Returns [`SyncError::InvalidTaskId`] in case it is malformed.
    pub fn parse(marker: &str) -> Result<Self> {
        let invalid = || SyncError::InvalidTaskId(marker.to_string());

        let url = Url::parse(marker).map_err(|_| invalid())?;
        if url.scheme() != MARKER_SCHEME || url.host_str() != Some(MARKER_HOST) {
            return Err(invalid());
        }

        let raw_task_id = url.path().strip_prefix('/').ok_or_else(invalid)?;
        if raw_task_id.is_empty() || raw_task_id.contains('/') {
            return Err(invalid());
        }
        let task_id = decode(raw_task_id).ok_or_else(invalid)?;

        let project_id = url.query_pairs()
            .find(|(key, _)| key == PROJECT_KEY)
            .map(|(_, value)| value.into_owned())
            .filter(|value| value.is_empty() == false)
            .ok_or_else(invalid)?;

        Ok(Self::new(TaskId::from(task_id), ProjectId::from(project_id)))
    }
}

impl Display for IdentityMarker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}/{}?{}={}",
            MARKER_SCHEME,
            MARKER_HOST,
            encode(self.task_id.as_str()),
            PROJECT_KEY,
            encode(self.project_id.as_str()),
        )
    }
}

fn encode(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn decode(s: &str) -> Option<String> {
    form_urlencoded::parse(s.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .filter(|key| key.is_empty() == false)
}



/// A bidirectional task id ⇄ event id association
///
/// There is at most one association per task id and per event id.
/// It also remembers what we last wrote into each event (see [`WrittenFields`]).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityMap {
    #[serde(default)]
    task_to_event: HashMap<TaskId, EventId>,
    #[serde(default)]
    event_to_task: HashMap<EventId, TaskId>,
    #[serde(default)]
    written: HashMap<EventId, WrittenFields>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a task and an event, after dropping any association either of them had
    pub fn add_mapping(&mut self, task_id: TaskId, event_id: EventId) {
        if let Some(previous_event) = self.task_to_event.remove(&task_id) {
            self.event_to_task.remove(&previous_event);
            if previous_event != event_id {
                self.written.remove(&previous_event);
            }
        }
        if let Some(previous_task) = self.event_to_task.remove(&event_id) {
            self.task_to_event.remove(&previous_task);
        }

        self.task_to_event.insert(task_id.clone(), event_id.clone());
        self.event_to_task.insert(event_id, task_id);
    }

    /// Remove the association of a task. Returns the event it was associated to.
    pub fn remove_by_task(&mut self, task_id: &TaskId) -> Option<EventId> {
        let event_id = self.task_to_event.remove(task_id)?;
        self.event_to_task.remove(&event_id);
        self.written.remove(&event_id);
        Some(event_id)
    }

    /// Remove the association of an event. Returns the task it was associated to.
    pub fn remove_by_event(&mut self, event_id: &EventId) -> Option<TaskId> {
        let task_id = self.event_to_task.remove(event_id)?;
        self.task_to_event.remove(&task_id);
        self.written.remove(event_id);
        Some(task_id)
    }

    pub fn event_for(&self, task_id: &TaskId) -> Option<&EventId> {
        self.task_to_event.get(task_id)
    }

    pub fn task_for(&self, event_id: &EventId) -> Option<&TaskId> {
        self.event_to_task.get(event_id)
    }

    /// Remember what has just been written into an event
    pub fn record_written(&mut self, event_id: EventId, fields: WrittenFields) {
        self.written.insert(event_id, fields);
    }

    /// What has last been written into an event, if known
    pub fn written(&self, event_id: &EventId) -> Option<&WrittenFields> {
        self.written.get(event_id)
    }

    pub fn len(&self) -> usize {
        self.task_to_event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_to_event.is_empty()
    }
}



/// Which calendar receives the tasks of a given project (in "one calendar per project" mode)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectCalendarMap {
    #[serde(default)]
    calendars: HashMap<ProjectId, CalendarId>,
}

impl ProjectCalendarMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a project to a calendar. A calendar can only be associated to one project.
    pub fn add_mapping(&mut self, project_id: ProjectId, calendar_id: CalendarId) {
        self.calendars.retain(|_, cal| cal != &calendar_id);
        self.calendars.insert(project_id, calendar_id);
    }

    pub fn remove_mapping(&mut self, project_id: &ProjectId) -> Option<CalendarId> {
        self.calendars.remove(project_id)
    }

    pub fn lookup(&self, project_id: &ProjectId) -> Option<&CalendarId> {
        self.calendars.get(project_id)
    }

    /// Every calendar of this map
    pub fn calendars(&self) -> impl Iterator<Item = &CalendarId> {
        self.calendars.values()
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn marker_format() {
        let marker = IdentityMarker::new(TaskId::from("42"), ProjectId::from("7"));
        assert_eq!(marker.to_string(), "taskcal://task/42?project=7");
        assert_eq!(IdentityMarker::parse("taskcal://task/42?project=7").unwrap(), marker);
    }

    #[test]
    fn marker_with_odd_characters() {
        let marker = IdentityMarker::new(TaskId::from("a b/c+d?e"), ProjectId::from("p&q=r"));
        let text = marker.to_string();
        assert_eq!(IdentityMarker::parse(&text).unwrap(), marker);
    }

    #[test]
    fn malformed_markers() {
        assert!(IdentityMarker::is_ours("taskcal://task/42?project=7"));
        assert!(IdentityMarker::is_ours("https://example.com") == false);
        assert!(IdentityMarker::is_ours("taskcalendar://task/1") == false);

        for bad in &[
            "taskcal://task/?project=7",
            "taskcal://task/42",
            "taskcal://task/42?project=",
            "taskcal://other/42?project=7",
            "taskcal://task/4/2?project=7",
            "https://task/42?project=7",
            "not a url",
        ] {
            assert_eq!(IdentityMarker::parse(bad), Err(SyncError::InvalidTaskId(bad.to_string())), "{}", bad);
        }
    }

    #[test]
    fn identity_exclusivity() {
        let t1 = TaskId::from("t1");
        let t2 = TaskId::from("t2");
        let e1 = EventId::from("e1");
        let e2 = EventId::from("e2");

        let mut map = IdentityMap::new();
        map.add_mapping(t1.clone(), e1.clone());
        map.add_mapping(t1.clone(), e2.clone());
        assert_eq!(map.task_for(&e1), None);
        assert_eq!(map.event_for(&t1), Some(&e2));
        assert_eq!(map.len(), 1);

        // Stealing an event from another task
        map.add_mapping(t2.clone(), e2.clone());
        assert_eq!(map.event_for(&t1), None);
        assert_eq!(map.event_for(&t2), Some(&e2));
        assert_eq!(map.task_for(&e2), Some(&t2));
        assert_eq!(map.len(), 1);

        assert_eq!(map.remove_by_event(&e2), Some(t2.clone()));
        assert!(map.is_empty());
        assert_eq!(map.remove_by_task(&t2), None);
    }

    #[test]
    fn written_fields_follow_mappings() {
        let fields = WrittenFields {
            title: "x".to_string(),
            notes: None,
            due: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            is_all_day: true,
            reminders: vec![],
        };
        let mut map = IdentityMap::new();
        map.add_mapping(TaskId::from("t"), EventId::from("e1"));
        map.record_written(EventId::from("e1"), fields.clone());

        // Same event again: the baseline stays
        map.add_mapping(TaskId::from("t"), EventId::from("e1"));
        assert_eq!(map.written(&EventId::from("e1")), Some(&fields));

        // Another event: the baseline of the old one is dropped
        map.add_mapping(TaskId::from("t"), EventId::from("e2"));
        assert_eq!(map.written(&EventId::from("e1")), None);

        let json = serde_json::to_string(&map).unwrap();
        let back: IdentityMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn project_calendars() {
        let mut map = ProjectCalendarMap::new();
        map.add_mapping(ProjectId::from("p1"), CalendarId::from("c1"));
        map.add_mapping(ProjectId::from("p2"), CalendarId::from("c2"));
        map.add_mapping(ProjectId::from("p1"), CalendarId::from("c3"));
        assert_eq!(map.lookup(&ProjectId::from("p1")), Some(&CalendarId::from("c3")));
        assert_eq!(map.len(), 2);

        map.add_mapping(ProjectId::from("p3"), CalendarId::from("c2"));
        assert_eq!(map.lookup(&ProjectId::from("p2")), None);
        assert_eq!(map.remove_mapping(&ProjectId::from("p3")), Some(CalendarId::from("c2")));
        assert_eq!(map.calendars().collect::<Vec<_>>(), vec![&CalendarId::from("c3")]);
    }
}
