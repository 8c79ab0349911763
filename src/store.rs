//! Persisted client state: the last rejoin token and session per directory
//! origin, so a restarted client can resume its member identity.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use frames::{RejoinToken, Session};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// What survives a restart for one origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejoin_token: Option<RejoinToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

/// Key-value persistence of [`PersistedState`] by origin.
pub trait ClientStore {
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage cannot be read.
    fn load(&self, origin: &str) -> Result<Option<PersistedState>, StoreError>;

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage cannot be written.
    fn save(&self, origin: &str, state: &PersistedState) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage cannot be written.
    fn clear(&self, origin: &str) -> Result<(), StoreError>;
}

type Entries = BTreeMap<String, PersistedState>;

/// JSON file holding one entry per origin. Writes go through a temporary
/// sibling file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Entries, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Entries::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(error) => Err(error.into()),
        }
    }

    fn write_all(&self, entries: &Entries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ClientStore for FileStore {
    fn load(&self, origin: &str) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.read_all()?.remove(origin))
    }

    fn save(&self, origin: &str, state: &PersistedState) -> Result<(), StoreError> {
        let mut entries = self.read_all()?;
        entries.insert(origin.to_owned(), state.clone());
        self.write_all(&entries)
    }

    fn clear(&self, origin: &str) -> Result<(), StoreError> {
        let mut entries = self.read_all()?;
        if entries.remove(origin).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<Entries>,
}

impl ClientStore for MemoryStore {
    fn load(&self, origin: &str) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.entries.borrow().get(origin).cloned())
    }

    fn save(&self, origin: &str, state: &PersistedState) -> Result<(), StoreError> {
        self.entries.borrow_mut().insert(origin.to_owned(), state.clone());
        Ok(())
    }

    fn clear(&self, origin: &str) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(origin);
        Ok(())
    }
}
