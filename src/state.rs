//! Persistence of the sync cursors, associations and setup
//!
//! Every piece of state is stored as an independent, versioned JSON document in a [`KeyValueStore`].
//! Documents that cannot be read are treated as if sync had never run: this only causes extra work, never data loss.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::identity::{IdentityMap, ProjectCalendarMap};
use crate::ids::CalendarId;
use crate::task::Project;
use crate::traits::KeyValueStore;

pub const STATE_KEY: &str = "sync.state";
pub const IDENTITY_MAP_KEY: &str = "sync.identity_map";
pub const PROJECT_CALENDARS_KEY: &str = "sync.project_calendars";
pub const SETUP_KEY: &str = "sync.setup";

/// Current version of the persisted documents
const DOCUMENT_VERSION: u32 = 1;

/// The cursors of the sync
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Update date of the newest task that has been pulled
    #[serde(default)]
    pub remote_cursor: Option<DateTime<Utc>>,
    /// Last time calendar events have been scanned for user edits
    #[serde(default)]
    pub last_local_scan: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Move the remote cursor forward. It never goes backwards.
    pub fn advance_remote_cursor(&mut self, to: DateTime<Utc>) {
        if self.remote_cursor.map(|current| current < to).unwrap_or(true) {
            self.remote_cursor = Some(to);
        }
    }

    /// Move the local scan timestamp forward. It never goes backwards.
    pub fn advance_local_scan(&mut self, to: DateTime<Utc>) {
        if self.last_local_scan.map(|current| current < to).unwrap_or(true) {
            self.last_local_scan = Some(to);
        }
    }
}

/// How tasks are dispatched into calendars
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarMode {
    /// Every task goes into a single calendar
    Single,
    /// Each project has its own calendar
    PerProject,
}

impl Default for CalendarMode {
    fn default() -> Self {
        CalendarMode::Single
    }
}

/// What the user has chosen during onboarding
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSetup {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: CalendarMode,
    #[serde(default)]
    pub projects: Vec<Project>,
    /// The calendar of [`CalendarMode::Single`]
    #[serde(default)]
    pub calendar_id: Option<CalendarId>,
}

#[derive(Serialize, Deserialize)]
struct Document<T> {
    #[serde(default)]
    version: u32,
    data: T,
}

/// Loads and saves the sync state into a [`KeyValueStore`]
#[derive(Debug)]
pub struct SyncStateStore<K: KeyValueStore> {
    backend: K,
}

impl<K: KeyValueStore> SyncStateStore<K> {
    pub fn new(backend: K) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    pub fn load_state(&self) -> SyncState {
        self.load_or_default(STATE_KEY)
    }
    pub fn save_state(&self, state: &SyncState) -> Result<()> {
        self.save(STATE_KEY, state)
    }

    pub fn load_identity_map(&self) -> IdentityMap {
        self.load_or_default(IDENTITY_MAP_KEY)
    }
    pub fn save_identity_map(&self, map: &IdentityMap) -> Result<()> {
        self.save(IDENTITY_MAP_KEY, map)
    }

    pub fn load_project_calendars(&self) -> ProjectCalendarMap {
        self.load_or_default(PROJECT_CALENDARS_KEY)
    }
    pub fn save_project_calendars(&self, map: &ProjectCalendarMap) -> Result<()> {
        self.save(PROJECT_CALENDARS_KEY, map)
    }

    pub fn load_setup(&self) -> SyncSetup {
        self.load_or_default(SETUP_KEY)
    }
    pub fn save_setup(&self, setup: &SyncSetup) -> Result<()> {
        self.save(SETUP_KEY, setup)
    }

    /// Forget everything. This is used when sync is disabled.
    ///
    /// Every key is attempted, the first error (if any) is returned.
    pub fn clear(&self) -> Result<()> {
        let mut result = Ok(());
        for key in &[STATE_KEY, IDENTITY_MAP_KEY, PROJECT_CALENDARS_KEY, SETUP_KEY] {
            if let Err(err) = self.backend.delete(key) {
                log::warn!("Unable to delete {}: {}", key, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let bytes = match self.backend.load(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return T::default(),
            Err(err) => {
                log::warn!("Unable to load {}: {}. Using a default value", key, err);
                return T::default();
            },
        };

        match serde_json::from_slice::<Document<T>>(&bytes) {
            Ok(doc) => {
                if doc.version > DOCUMENT_VERSION {
                    log::debug!("{} has been written by a newer version ({}), reading it anyway", key, doc.version);
                }
                doc.data
            },
            Err(err) => {
                log::warn!("Invalid content for {}: {}. Using a default value", key, err);
                T::default()
            },
        }
    }

    fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let doc = Document { version: DOCUMENT_VERSION, data };
        let bytes = serde_json::to_vec(&doc)?;
        self.backend.save(key, &bytes)
    }
}
