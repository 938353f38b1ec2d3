//! Configuration for the replicator.

use std::path::{Path, PathBuf};

/// Suffix appended to the local copy of a conflicting remote file.
pub const DEFAULT_CONFLICT_SUFFIX: &str = ".conflict";

/// Configuration shared by the local enumerator, the cloud services and the
/// replicator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The managed local notes directory.
    pub notes_dir: PathBuf,
    /// Remote folder path. Empty means the application folder root.
    pub remote_root: String,
    /// Suffix used to preserve the remote side of a conflict locally.
    pub conflict_suffix: String,
    /// Whether to create the notes directory when it is missing.
    pub create_notes_dir: bool,
}

impl SyncConfig {
    /// Creates a new configuration for the given notes directory.
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            remote_root: String::new(),
            conflict_suffix: DEFAULT_CONFLICT_SUFFIX.to_string(),
            create_notes_dir: true,
        }
    }

    /// Sets the remote folder path.
    pub fn with_remote_root(mut self, root: impl Into<String>) -> Self {
        self.remote_root = root.into();
        self
    }

    /// Sets the conflict suffix.
    pub fn with_conflict_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.conflict_suffix = suffix.into();
        self
    }

    /// Sets whether a missing notes directory is created.
    pub fn with_create_notes_dir(mut self, create: bool) -> Self {
        self.create_notes_dir = create;
        self
    }

    /// Returns the notes directory.
    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    /// Name under which the remote side of a conflict on `name` is kept.
    pub fn conflict_name(&self, name: &str) -> String {
        format!("{}{}", name, self.conflict_suffix)
    }
}
