//! File descriptors and enumeration snapshots.
//!
//! Both enumerators produce the same [`FileDescriptor`] shape. The `name` is
//! the only correlation key between the two sides; there is no content hash,
//! inode identity or move detection, so a rename is seen as delete + create.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// Which endpoint a descriptor was enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The managed local directory.
    Local,
    /// The remote cloud folder.
    Remote,
}

/// Opaque value the originating enumerator needs for later operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileHandle {
    /// Absolute path of a local file.
    Local(PathBuf),
    /// Provider-specific identifier of a remote file.
    Remote(String),
}

impl FileHandle {
    /// Side the handle belongs to.
    pub fn side(&self) -> Side {
        match self {
            FileHandle::Local(_) => Side::Local,
            FileHandle::Remote(_) => Side::Remote,
        }
    }
}

/// Metadata describing one file on one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Leaf file name, unique within its side's snapshot.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification instant as recorded by the side's own clock.
    pub last_modified: DateTime<Utc>,
    /// Location string used in event messages.
    pub path: String,
    /// Handle for follow-up operations.
    pub handle: FileHandle,
}

impl FileDescriptor {
    /// Creates a descriptor for a local file.
    pub fn local(
        name: impl Into<String>,
        size: u64,
        last_modified: DateTime<Utc>,
        path: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified,
            path: path.display().to_string(),
            handle: FileHandle::Local(path),
        }
    }

    /// Creates a descriptor for a remote file.
    pub fn remote(
        name: impl Into<String>,
        size: u64,
        last_modified: DateTime<Utc>,
        id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: name.into(),
            size,
            last_modified,
            path: id.clone(),
            handle: FileHandle::Remote(id),
        }
    }

    /// Side the descriptor was enumerated from.
    pub fn side(&self) -> Side {
        self.handle.side()
    }

    /// True if the file changed after `since`.
    pub fn changed_since(&self, since: DateTime<Utc>) -> bool {
        self.last_modified > since
    }

    /// Fails with [`SyncError::WrongSide`] unless the descriptor is on `side`.
    pub fn expect_side(&self, side: Side) -> SyncResult<()> {
        if self.side() == side {
            Ok(())
        } else {
            Err(SyncError::WrongSide {
                name: self.name.clone(),
                expected: side,
            })
        }
    }
}

/// An enumeration snapshot of one side.
///
/// Iteration follows insertion order; lookups by name go through an index.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<FileDescriptor>,
    by_name: HashMap<String, usize>,
}

impl FileSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set, rejecting duplicate names.
    pub fn from_files(files: impl IntoIterator<Item = FileDescriptor>) -> SyncResult<Self> {
        let mut set = Self::new();
        for file in files {
            set.push(file)?;
        }
        Ok(set)
    }

    /// Appends a descriptor.
    pub fn push(&mut self, file: FileDescriptor) -> SyncResult<()> {
        if self.by_name.contains_key(&file.name) {
            return Err(SyncError::Protocol(format!(
                "duplicate file name in listing: {}",
                file.name
            )));
        }
        self.by_name.insert(file.name.clone(), self.files.len());
        self.files.push(file);
        Ok(())
    }

    /// Finds a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&FileDescriptor> {
        self.by_name.get(name).map(|&i| &self.files[i])
    }

    /// True if a file with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterates in snapshot order.
    pub fn iter(&self) -> std::slice::Iter<'_, FileDescriptor> {
        self.files.iter()
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Names in snapshot order.
    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileDescriptor;
    type IntoIter = std::slice::Iter<'a, FileDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
