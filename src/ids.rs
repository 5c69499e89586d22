//! Identifiers of tasks, projects, calendars and events

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Declares a string-backed identifier type
macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Generate a random identifier
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4().to_hyphenated().to_string())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// The id of a task, as given by the Task Service
    TaskId
);
string_id!(
    /// The id of a project (a list of tasks) in the Task Service
    ProjectId
);
string_id!(
    /// The id of a calendar in the calendar store
    CalendarId
);
string_id!(
    /// The id of an event in the calendar store.
    ///
    /// The calendar store may invalidate these handles at any time, see [`crate::identity::IdentityMarker`] for a durable way to find an event back.
    EventId
);
string_id!(
    /// A writable source (account) of the calendar store, that calendars can be created in
    SourceId
);
