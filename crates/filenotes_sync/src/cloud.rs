//! Cloud service facade.
//!
//! The replicator depends only on [`CloudService`]. Concrete services map the
//! capability set onto a provider: [`MemoryCloud`] for tests,
//! [`DirectoryCloud`] for a mounted or synced folder, and
//! [`DropboxCloud`](crate::DropboxCloud) for the Dropbox HTTP API.
//!
//! A service is bound to the [`LocalFileSystem`] it downloads into and
//! uploads from.

use crate::descriptor::{FileDescriptor, FileSet, Side};
use crate::error::{SyncError, SyncResult};
use crate::local::{validate_name, LocalFileSystem};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Capability set of a cloud storage provider.
pub trait CloudService: Send + Sync {
    /// True if a usable session exists.
    fn is_authenticated(&self) -> bool;

    /// Starts credential acquisition if not authenticated. Idempotent.
    fn login(&self) -> SyncResult<()>;

    /// Clears stored credentials.
    fn logout(&self) -> SyncResult<()>;

    /// Lists the managed remote folder (flat).
    fn files(&self) -> SyncResult<FileSet>;

    /// Local directory this service transfers to and from.
    fn local(&self) -> &LocalFileSystem;

    /// Fetches a remote file into the notes directory, under its own name or
    /// under `rename_to`.
    fn download(&self, file: &FileDescriptor, rename_to: Option<&str>) -> SyncResult<()>;

    /// Copies a local file to the remote folder under the same name.
    fn upload(&self, file: &FileDescriptor) -> SyncResult<()>;

    /// Removes a remote file.
    fn delete_remote(&self, file: &FileDescriptor) -> SyncResult<()>;

    /// Removes a file from the side its descriptor belongs to.
    fn delete(&self, file: &FileDescriptor) -> SyncResult<()> {
        match file.side() {
            Side::Local => self.local().delete(&file.name),
            Side::Remote => self.delete_remote(file),
        }
    }
}

/// A file held by [`MemoryCloud`].
#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// An in-memory remote folder for testing.
///
/// Uploads are stamped with the current time, the same way a provider
/// stamps its server-side modification time.
pub struct MemoryCloud {
    local: LocalFileSystem,
    files: RwLock<BTreeMap<String, MemoryFile>>,
    authenticated: AtomicBool,
    fail_listing: AtomicBool,
    failing_names: RwLock<HashSet<String>>,
}

impl MemoryCloud {
    /// Creates an empty, authenticated remote bound to `local`.
    pub fn new(local: LocalFileSystem) -> Self {
        Self {
            local,
            files: RwLock::new(BTreeMap::new()),
            authenticated: AtomicBool::new(true),
            fail_listing: AtomicBool::new(false),
            failing_names: RwLock::new(HashSet::new()),
        }
    }

    /// Places a file in the remote folder with an explicit modification time.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        self.files.write().insert(
            name.into(),
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
    }

    /// Removes a file behind the replicator's back.
    pub fn remove(&self, name: &str) -> bool {
        self.files.write().remove(name).is_some()
    }

    /// Content of a remote file.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().get(name).map(|f| f.data.clone())
    }

    /// Modification time of a remote file.
    pub fn modified(&self, name: &str) -> Option<DateTime<Utc>> {
        self.files.read().get(name).map(|f| f.modified)
    }

    /// Remote names in order.
    pub fn names(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Sets the session state.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Makes every listing fail.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Makes every transfer of `name` fail.
    pub fn fail_transfers_for(&self, name: impl Into<String>) {
        self.failing_names.write().insert(name.into());
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        self.fail_listing.store(false, Ordering::SeqCst);
        self.failing_names.write().clear();
    }

    fn check_transfer(&self, name: &str) -> SyncResult<()> {
        if !self.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }
        if self.failing_names.read().contains(name) {
            return Err(SyncError::provider_retryable(format!(
                "injected transfer failure for {}",
                name
            )));
        }
        Ok(())
    }
}

impl CloudService for MemoryCloud {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn login(&self) -> SyncResult<()> {
        self.set_authenticated(true);
        Ok(())
    }

    fn logout(&self) -> SyncResult<()> {
        self.set_authenticated(false);
        Ok(())
    }

    fn files(&self) -> SyncResult<FileSet> {
        if !self.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(SyncError::provider_retryable("injected listing failure"));
        }

        FileSet::from_files(
            self.files
                .read()
                .iter()
                .filter(|(name, _)| validate_name(name).is_ok())
                .map(|(name, file)| {
                    FileDescriptor::remote(
                        name.clone(),
                        file.data.len() as u64,
                        file.modified,
                        format!("/{}", name),
                    )
                }),
        )
    }

    fn local(&self) -> &LocalFileSystem {
        &self.local
    }

    fn download(&self, file: &FileDescriptor, rename_to: Option<&str>) -> SyncResult<()> {
        file.expect_side(Side::Remote)?;
        self.check_transfer(&file.name)?;

        let data = self
            .contents(&file.name)
            .ok_or_else(|| SyncError::NotFound(file.name.clone()))?;
        self.local.write(rename_to.unwrap_or(&file.name), &data)
    }

    fn upload(&self, file: &FileDescriptor) -> SyncResult<()> {
        file.expect_side(Side::Local)?;
        self.check_transfer(&file.name)?;

        let data = self.local.read(&file.name)?;
        self.insert(file.name.clone(), data, Utc::now());
        Ok(())
    }

    fn delete_remote(&self, file: &FileDescriptor) -> SyncResult<()> {
        file.expect_side(Side::Remote)?;
        self.check_transfer(&file.name)?;

        if self.remove(&file.name) {
            Ok(())
        } else {
            Err(SyncError::NotFound(file.name.clone()))
        }
    }
}

/// A remote folder that is another directory, such as a network share or a
/// folder kept in sync by a desktop client.
pub struct DirectoryCloud {
    local: LocalFileSystem,
    remote_dir: std::path::PathBuf,
}

impl DirectoryCloud {
    /// Creates a service copying between `local` and `remote_dir`.
    pub fn new(local: LocalFileSystem, remote_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            local,
            remote_dir: remote_dir.into(),
        }
    }

    /// The remote directory.
    pub fn remote_dir(&self) -> &Path {
        &self.remote_dir
    }

    fn remote(&self) -> SyncResult<LocalFileSystem> {
        LocalFileSystem::open_dir(&self.remote_dir, false).map_err(provider_error)
    }
}

/// Remote-side I/O failures are provider failures, not local ones.
fn provider_error(err: SyncError) -> SyncError {
    match err {
        SyncError::Io(e) => SyncError::provider_retryable(e.to_string()),
        other => other,
    }
}

impl CloudService for DirectoryCloud {
    fn is_authenticated(&self) -> bool {
        self.remote_dir.is_dir()
    }

    fn login(&self) -> SyncResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(SyncError::NotAuthenticated)
        }
    }

    fn logout(&self) -> SyncResult<()> {
        Ok(())
    }

    fn files(&self) -> SyncResult<FileSet> {
        let listing = self.remote()?.files().map_err(provider_error)?;
        FileSet::from_files(listing.iter().map(|f| {
            FileDescriptor::remote(
                f.name.clone(),
                f.size,
                f.last_modified,
                self.remote_dir.join(&f.name).display().to_string(),
            )
        }))
    }

    fn local(&self) -> &LocalFileSystem {
        &self.local
    }

    fn download(&self, file: &FileDescriptor, rename_to: Option<&str>) -> SyncResult<()> {
        file.expect_side(Side::Remote)?;
        let data = self.remote()?.read(&file.name).map_err(provider_error)?;
        self.local.write(rename_to.unwrap_or(&file.name), &data)
    }

    fn upload(&self, file: &FileDescriptor) -> SyncResult<()> {
        file.expect_side(Side::Local)?;
        validate_name(&file.name)?;
        let data = self.local.read(&file.name)?;
        self.remote()?.write(&file.name, &data).map_err(provider_error)
    }

    fn delete_remote(&self, file: &FileDescriptor) -> SyncResult<()> {
        file.expect_side(Side::Remote)?;
        self.remote()?.delete(&file.name).map_err(provider_error)
    }
}
