//! Local filesystem service for the managed notes directory.
//!
//! The notes directory is flat: only regular files directly inside it are
//! managed. Subdirectories and symlinks are ignored by enumeration.
//!
//! ```text
//! <notes_dir>/
//! ├─ shopping.txt
//! ├─ todo.md
//! ├─ todo.md.conflict       # remote side of an earlier conflict
//! └─ .todo.md.filenotes.tmp # in-flight atomic write, never listed
//! ```

use crate::config::SyncConfig;
use crate::descriptor::{FileDescriptor, FileSet};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Suffix of temporary files used for atomic writes.
const TEMP_SUFFIX: &str = ".filenotes.tmp";

/// Service over the flat managed notes directory.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Opens the notes directory described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing and
    /// `config.create_notes_dir` is false, or if the path is not a directory.
    pub fn open(config: &SyncConfig) -> SyncResult<Self> {
        Self::open_dir(config.notes_dir(), config.create_notes_dir)
    }

    /// Opens a notes directory by path.
    pub fn open_dir(path: &Path, create_if_missing: bool) -> SyncResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(SyncError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("notes directory does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(SyncError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Returns the notes directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the full path of a managed file.
    pub fn path_of(&self, name: &str) -> SyncResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Enumerates the managed files, sorted by name.
    pub fn files(&self) -> SyncResult<FileSet> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            // file_type() does not follow symlinks
            if !entry.file_type()?.is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            if validate_name(&name).is_err() {
                tracing::debug!(name = %name, "skipping unmanaged file name");
                continue;
            }

            let metadata = entry.metadata()?;
            files.push(FileDescriptor::local(
                name,
                metadata.len(),
                DateTime::<Utc>::from(metadata.modified()?),
                entry.path(),
            ));
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        FileSet::from_files(files)
    }

    /// Describes a single managed file.
    pub fn describe(&self, name: &str) -> SyncResult<FileDescriptor> {
        let path = self.path_of(name)?;
        let metadata = fs::metadata(&path).map_err(|e| not_found(e, name))?;
        Ok(FileDescriptor::local(
            name,
            metadata.len(),
            DateTime::<Utc>::from(metadata.modified()?),
            path,
        ))
    }

    /// Reads a managed file.
    pub fn read(&self, name: &str) -> SyncResult<Vec<u8>> {
        let path = self.path_of(name)?;
        fs::read(&path).map_err(|e| not_found(e, name))
    }

    /// Replaces a managed file atomically.
    pub fn write(&self, name: &str, data: &[u8]) -> SyncResult<()> {
        validate_name(name)?;
        write_atomic(&self.root, name, data)
    }

    /// Deletes a managed file.
    pub fn delete(&self, name: &str) -> SyncResult<()> {
        let path = self.path_of(name)?;
        fs::remove_file(&path).map_err(|e| not_found(e, name))
    }

    /// Overrides the recorded modification time of a managed file.
    pub fn set_modified(&self, name: &str, at: DateTime<Utc>) -> SyncResult<()> {
        let path = self.path_of(name)?;
        let file = File::options()
            .write(true)
            .open(&path)
            .map_err(|e| not_found(e, name))?;
        file.set_modified(SystemTime::from(at))?;
        Ok(())
    }
}

/// Rejects names that would escape or nest inside a flat directory, and
/// names reserved for in-flight writes.
///
/// Both sides list only names that pass, so a reserved or unusable name is
/// never replicated in either direction.
pub fn validate_name(name: &str) -> SyncResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || (cfg!(windows) && name.contains('\\'))
        || name.contains('\0')
        || is_reserved_name(name)
    {
        return Err(SyncError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// True for names shaped like the temp files of an atomic write.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

fn not_found(err: std::io::Error, name: &str) -> SyncError {
    if err.kind() == ErrorKind::NotFound {
        SyncError::NotFound(name.to_string())
    } else {
        SyncError::Io(err)
    }
}

/// Writes `data` to `dir/name` via a temporary sibling and a rename.
pub(crate) fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> SyncResult<()> {
    let target = dir.join(name);
    let temp = dir.join(format!(".{}{}", name, TEMP_SUFFIX));

    let mut file = File::create(&temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp, &target)?;
    Ok(())
}
