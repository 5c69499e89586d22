//! Calendars of the calendar store

pub mod memory_calendar;

use serde::{Deserialize, Serialize};

use crate::ids::{CalendarId, SourceId};

/// A calendar, as seen in a calendar store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    id: CalendarId,
    name: String,
    source: SourceId,
}

impl Calendar {
    pub fn new(id: CalendarId, name: String, source: SourceId) -> Self {
        Self { id, name, source }
    }

    pub fn id(&self) -> &CalendarId     { &self.id     }
    pub fn name(&self) -> &str          { &self.name   }
    pub fn source(&self) -> &SourceId   { &self.source }
}
