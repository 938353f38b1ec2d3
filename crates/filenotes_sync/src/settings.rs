//! Settings and notes-manager collaborators.
//!
//! The replicator persists exactly one piece of state across runs, the
//! `last_sync` checkpoint. `None` is the "never synced" sentinel and selects
//! the first-sync algorithm.

use crate::error::{SyncError, SyncResult};
use crate::local::write_atomic;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted replication settings.
pub trait SettingsStore: Send + Sync {
    /// Instant of the last successful run, `None` if there never was one.
    fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>>;

    /// Records a successful run.
    fn set_last_sync(&self, at: DateTime<Utc>) -> SyncResult<()>;

    /// Stored provider access token.
    fn access_token(&self) -> Option<String>;

    /// Stores a provider access token.
    fn set_access_token(&self, token: &str) -> SyncResult<()>;

    /// Forgets the provider access token.
    fn clear_access_token(&self) -> SyncResult<()>;
}

/// Holder of the "replication required" dirty bit.
pub trait NotesManager: Send + Sync {
    /// True if an editor asked for a replication run.
    fn replication_required(&self) -> bool;

    /// Sets or clears the dirty bit.
    fn set_replication_required(&self, required: bool) -> SyncResult<()>;
}

/// Serialized settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsData {
    /// Last successful run.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Dirty bit.
    #[serde(default = "default_replication_required")]
    pub replication_required: bool,
    /// Dropbox access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_replication_required() -> bool {
    true
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            last_sync: None,
            replication_required: default_replication_required(),
            access_token: None,
        }
    }
}

/// In-memory settings for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySettings {
    data: RwLock<SettingsData>,
}

impl MemorySettings {
    /// Creates never-synced settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates settings with a checkpoint.
    pub fn with_last_sync(at: DateTime<Utc>) -> Self {
        let settings = Self::new();
        settings.data.write().last_sync = Some(at);
        settings
    }

    /// Snapshot of the current values.
    pub fn snapshot(&self) -> SettingsData {
        self.data.read().clone()
    }
}

impl SettingsStore for MemorySettings {
    fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.data.read().last_sync)
    }

    fn set_last_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        self.data.write().last_sync = Some(at);
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.data.read().access_token.clone()
    }

    fn set_access_token(&self, token: &str) -> SyncResult<()> {
        self.data.write().access_token = Some(token.to_string());
        Ok(())
    }

    fn clear_access_token(&self) -> SyncResult<()> {
        self.data.write().access_token = None;
        Ok(())
    }
}

impl NotesManager for MemorySettings {
    fn replication_required(&self) -> bool {
        self.data.read().replication_required
    }

    fn set_replication_required(&self, required: bool) -> SyncResult<()> {
        self.data.write().replication_required = required;
        Ok(())
    }
}

/// Settings persisted as a JSON document.
///
/// Every change is written through with a write-then-rename, so a crash
/// leaves either the old or the new document.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    data: RwLock<SettingsData>,
}

impl FileSettings {
    /// Loads settings from `path`; a missing file yields defaults.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let data = load(&path)?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Re-reads the document, picking up changes made by other writers.
    /// On error the current values are kept.
    pub fn reload(&self) -> SyncResult<()> {
        let data = load(&self.path)?;
        *self.data.write() = data;
        Ok(())
    }

    /// Path of the settings document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current values.
    pub fn snapshot(&self) -> SettingsData {
        self.data.read().clone()
    }

    fn update(&self, change: impl FnOnce(&mut SettingsData)) -> SyncResult<()> {
        let mut data = self.data.write();
        let mut next = data.clone();
        change(&mut next);

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SyncError::Settings(format!("bad settings path: {:?}", self.path)))?;

        std::fs::create_dir_all(dir)?;
        write_atomic(dir, name, &serde_json::to_vec_pretty(&next)?)?;
        *data = next;
        Ok(())
    }
}

fn load(path: &Path) -> SyncResult<SettingsData> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(SettingsData::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsData::default()),
        Err(e) => Err(e.into()),
    }
}

impl SettingsStore for FileSettings {
    fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.data.read().last_sync)
    }

    fn set_last_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        self.update(|d| d.last_sync = Some(at))
    }

    fn access_token(&self) -> Option<String> {
        self.data.read().access_token.clone()
    }

    fn set_access_token(&self, token: &str) -> SyncResult<()> {
        self.update(|d| d.access_token = Some(token.to_string()))
    }

    fn clear_access_token(&self) -> SyncResult<()> {
        self.update(|d| d.access_token = None)
    }
}

impl NotesManager for FileSettings {
    fn replication_required(&self) -> bool {
        self.data.read().replication_required
    }

    fn set_replication_required(&self, required: bool) -> SyncResult<()> {
        self.update(|d| d.replication_required = required)
    }
}
