//! Key-value stores that can back a [`SyncStateStore`](crate::state::SyncStateStore)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::traits::KeyValueStore;

/// A key-value store that only lives in memory
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The keys currently stored
    pub fn keys(&self) -> Vec<String> {
        match self.data.lock() {
            Ok(data) => data.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self.data.lock().map_err(|_| poisoned())?;
        Ok(data.get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        data.remove(key);
        Ok(())
    }
}

fn poisoned() -> SyncError {
    SyncError::Storage("the store lock has been poisoned".to_string())
}



/// A key-value store that saves each key into its own file of a folder
#[derive(Debug)]
pub struct FolderKeyValueStore {
    backing_folder: PathBuf,
}

impl FolderKeyValueStore {
    /// Use `folder` to store values. It is created in case it does not exist.
    pub fn new(folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(folder)?;
        Ok(Self { backing_folder: PathBuf::from(folder) })
    }

    pub fn folder(&self) -> &Path {
        &self.backing_folder
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name = format!("{}.json", sanitize_filename::sanitize(key));
        self.backing_folder.join(file_name)
    }
}

impl KeyValueStore for FolderKeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SyncError::Storage(format!("Unable to read {:?}: {}", path, err))),
        }
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        // Write then rename, so that a crash never leaves a truncated file behind
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, value)
            .map_err(|err| SyncError::Storage(format!("Unable to write {:?}: {}", tmp_path, err)))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|err| SyncError::Storage(format!("Unable to save {:?}: {}", path, err)))?;
        log::trace!("Saved {} into {:?}", key, path);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SyncError::Storage(format!("Unable to delete {:?}: {}", path, err))),
        }
    }
}
