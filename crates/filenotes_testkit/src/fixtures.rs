//! Test fixtures and replication helpers.
//!
//! A [`TestWorkspace`] owns a temporary notes directory, an in-memory remote
//! bound to it and in-memory settings. Every replicator it builds has its own
//! run latch, so tests can run in parallel.

use chrono::{DateTime, TimeZone, Utc};
use filenotes_sync::{
    ChannelObserver, Event, LocalFileSystem, MemoryCloud, MemorySettings, Replicator, RunLatch,
    SettingsStore, SyncConfig,
};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tempfile::TempDir;

/// The replicator type built by [`TestWorkspace`].
pub type TestReplicator = Replicator<MemoryCloud, MemorySettings, MemorySettings>;

/// Instant `secs` seconds after the Unix epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .expect("timestamp in range")
}

/// A notes directory and a remote folder with automatic cleanup.
pub struct TestWorkspace {
    /// Replication configuration.
    pub config: SyncConfig,
    /// The notes directory.
    pub local: LocalFileSystem,
    /// The in-memory remote.
    pub cloud: Arc<MemoryCloud>,
    /// Settings and notes manager.
    pub settings: Arc<MemorySettings>,
    _temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a never-synced workspace.
    pub fn new() -> Self {
        Self::build(MemorySettings::new())
    }

    /// Creates a workspace whose last successful run was at `last_sync`.
    pub fn with_last_sync(last_sync: DateTime<Utc>) -> Self {
        Self::build(MemorySettings::with_last_sync(last_sync))
    }

    fn build(settings: MemorySettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = SyncConfig::new(temp_dir.path().join("notes"));
        let local = LocalFileSystem::open(&config).expect("Failed to open notes directory");

        Self {
            cloud: Arc::new(MemoryCloud::new(local.clone())),
            settings: Arc::new(settings),
            config,
            local,
            _temp_dir: temp_dir,
        }
    }

    /// The notes directory path.
    pub fn notes_dir(&self) -> &Path {
        self.local.root()
    }

    /// Writes a local file and stamps it with `mtime`.
    pub fn write_local(&self, name: &str, data: impl AsRef<[u8]>, mtime: DateTime<Utc>) {
        self.local
            .write(name, data.as_ref())
            .expect("Failed to write local file");
        self.local
            .set_modified(name, mtime)
            .expect("Failed to set local mtime");
    }

    /// Places a remote file modified at `mtime`.
    pub fn write_remote(&self, name: &str, data: impl AsRef<[u8]>, mtime: DateTime<Utc>) {
        self.cloud.insert(name, data.as_ref(), mtime);
    }

    /// Content of a local file, `None` if absent.
    pub fn read_local(&self, name: &str) -> Option<Vec<u8>> {
        self.local.read(name).ok()
    }

    /// Local names in order.
    pub fn local_names(&self) -> Vec<String> {
        self.local
            .files()
            .expect("Failed to list notes directory")
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    /// Remote names in order.
    pub fn remote_names(&self) -> Vec<String> {
        self.cloud.names()
    }

    /// The persisted checkpoint.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.settings.last_sync().expect("Failed to read checkpoint")
    }

    /// A replicator over this workspace with a private latch.
    pub fn replicator(&self) -> TestReplicator {
        Replicator::new(
            self.config.clone(),
            Arc::clone(&self.cloud),
            Arc::clone(&self.settings),
            Arc::clone(&self.settings),
        )
        .with_latch(Arc::new(RunLatch::new()))
    }

    /// A replicator with a channel observer attached.
    pub fn observed_replicator(&self) -> (TestReplicator, Receiver<Event>) {
        let replicator = self.replicator();
        let (observer, events) = ChannelObserver::new();
        replicator.add_observer(observer);
        (replicator, events)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains every event received so far.
pub fn drain(events: &Receiver<Event>) -> Vec<Event> {
    events.try_iter().collect()
}
