//! CLI command implementations.

pub mod http_client;
pub mod login;
pub mod plan;
pub mod status;
pub mod sync;
pub mod watch;

use clap::Args;
use filenotes_sync::{
    CloudService, DirectoryCloud, DropboxCloud, FileDescriptor, FileSet, FileSettings,
    LocalFileSystem, Replicator, SyncConfig, SyncError, SyncResult,
};
use fs2::FileExt;
use http_client::ReqwestClient;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Application key used when none is configured.
pub const DEFAULT_APP_KEY: &str = "filenotes";

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Another process holds the settings lock.
    #[error("settings are in use by another process: {0}")]
    Locked(PathBuf),

    /// No remote was selected.
    #[error("choose a remote with --remote-dir or --dropbox")]
    NoRemote,

    /// The remote has no session.
    #[error("not logged in; run `filenotes login`")]
    NotAuthenticated,

    /// A replication run did not complete.
    #[error("replication failed: {0}")]
    RunFailed(SyncError),

    /// Library error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON output error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// HTTP client setup error.
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Remote selection shared by `sync`, `plan` and `watch`.
#[derive(Debug, Clone, Args)]
pub struct RemoteArgs {
    /// Replicate with this directory
    #[arg(long, conflicts_with = "dropbox")]
    pub remote_dir: Option<PathBuf>,

    /// Replicate with the Dropbox application folder
    #[arg(long)]
    pub dropbox: bool,

    /// Folder inside the remote, empty for its root
    #[arg(long, default_value = "")]
    pub remote_root: String,

    /// Dropbox application key
    #[arg(long, env = "FILENOTES_DROPBOX_APP_KEY", default_value = DEFAULT_APP_KEY)]
    pub app_key: String,
}

/// A remote chosen at run time.
pub enum Remote {
    /// A plain directory.
    Directory(DirectoryCloud),
    /// Dropbox over HTTPS.
    Dropbox(DropboxCloud<ReqwestClient, FileSettings>),
}

impl CloudService for Remote {
    fn is_authenticated(&self) -> bool {
        match self {
            Remote::Directory(c) => c.is_authenticated(),
            Remote::Dropbox(c) => c.is_authenticated(),
        }
    }

    fn login(&self) -> SyncResult<()> {
        match self {
            Remote::Directory(c) => c.login(),
            Remote::Dropbox(c) => c.login(),
        }
    }

    fn logout(&self) -> SyncResult<()> {
        match self {
            Remote::Directory(c) => c.logout(),
            Remote::Dropbox(c) => c.logout(),
        }
    }

    fn files(&self) -> SyncResult<FileSet> {
        match self {
            Remote::Directory(c) => c.files(),
            Remote::Dropbox(c) => c.files(),
        }
    }

    fn local(&self) -> &LocalFileSystem {
        match self {
            Remote::Directory(c) => c.local(),
            Remote::Dropbox(c) => c.local(),
        }
    }

    fn download(&self, file: &FileDescriptor, rename_to: Option<&str>) -> SyncResult<()> {
        match self {
            Remote::Directory(c) => c.download(file, rename_to),
            Remote::Dropbox(c) => c.download(file, rename_to),
        }
    }

    fn upload(&self, file: &FileDescriptor) -> SyncResult<()> {
        match self {
            Remote::Directory(c) => c.upload(file),
            Remote::Dropbox(c) => c.upload(file),
        }
    }

    fn delete_remote(&self, file: &FileDescriptor) -> SyncResult<()> {
        match self {
            Remote::Directory(c) => c.delete_remote(file),
            Remote::Dropbox(c) => c.delete_remote(file),
        }
    }
}

/// The replicator type used by the commands.
pub type CliReplicator = Replicator<Remote, FileSettings, FileSettings>;

/// Opened settings plus the cross-process lock guarding them.
pub struct Context {
    /// Replication configuration.
    pub config: SyncConfig,
    /// Settings document.
    pub settings: Arc<FileSettings>,
    _lock: Option<File>,
}

impl Context {
    /// Opens the settings for writing, taking the lock next to them.
    pub fn open(notes_dir: &Path, settings_path: &Path) -> Result<Self, CliError> {
        let lock = lock_settings(settings_path)?;
        Ok(Self {
            config: SyncConfig::new(notes_dir),
            settings: Arc::new(FileSettings::open(settings_path)?),
            _lock: Some(lock),
        })
    }

    /// Opens the settings for reading only.
    pub fn open_read_only(notes_dir: &Path, settings_path: &Path) -> Result<Self, CliError> {
        Ok(Self {
            config: SyncConfig::new(notes_dir),
            settings: Arc::new(FileSettings::open(settings_path)?),
            _lock: None,
        })
    }

    /// Opens the notes directory, creating it if needed.
    pub fn local(&self) -> Result<LocalFileSystem, CliError> {
        Ok(LocalFileSystem::open(&self.config)?)
    }

    /// Builds the remote selected by `args`.
    pub fn remote(&self, args: &RemoteArgs) -> Result<Remote, CliError> {
        let config = self.config.clone().with_remote_root(args.remote_root.clone());
        let local = LocalFileSystem::open(&config)?;

        if let Some(dir) = &args.remote_dir {
            return Ok(Remote::Directory(DirectoryCloud::new(
                local,
                dir.join(args.remote_root.trim_start_matches('/')),
            )));
        }
        if args.dropbox {
            return Ok(Remote::Dropbox(self.dropbox(&config, local, &args.app_key)?));
        }
        Err(CliError::NoRemote)
    }

    /// Builds a Dropbox service over these settings.
    pub fn dropbox(
        &self,
        config: &SyncConfig,
        local: LocalFileSystem,
        app_key: &str,
    ) -> Result<DropboxCloud<ReqwestClient, FileSettings>, CliError> {
        Ok(DropboxCloud::new(
            config,
            ReqwestClient::new()?,
            Arc::clone(&self.settings),
            local,
            app_key,
        ))
    }

    /// Builds a replicator for `remote`.
    pub fn replicator(&self, remote: Remote) -> CliReplicator {
        Replicator::new(
            self.config.clone(),
            Arc::new(remote),
            Arc::clone(&self.settings),
            Arc::clone(&self.settings),
        )
    }
}

/// Path of the lock file guarding `settings_path`.
pub fn lock_path(settings_path: &Path) -> PathBuf {
    let mut name = settings_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    settings_path.with_file_name(name)
}

fn lock_settings(settings_path: &Path) -> Result<File, CliError> {
    let path = lock_path(settings_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;

    // Non-blocking: a second process fails fast.
    if file.try_lock_exclusive().is_err() {
        return Err(CliError::Locked(path));
    }
    Ok(file)
}
