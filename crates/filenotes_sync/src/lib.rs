//! # Filenotes Sync
//!
//! Bidirectional replication between a local notes directory and a cloud
//! folder.
//!
//! This crate provides:
//! - Local enumeration of the notes directory
//! - Cloud services (in-memory, directory-backed, Dropbox)
//! - First-sync and incremental reconciliation
//! - Conflict preservation under a suffixed name
//! - Change events for observers
//!
//! ## Architecture
//!
//! A run is a snapshot-then-apply cycle:
//! 1. Enumerate both sides into [`FileSet`]s
//! 2. Build a [`Plan`] from the snapshots and the `last_sync` checkpoint
//! 3. Apply the plan in order, emitting an [`Event`] per update
//! 4. Advance the checkpoint
//!
//! ## Key Invariants
//!
//! - At most one run per process at a time
//! - First sync never deletes
//! - A conflict never destroys either version
//! - The checkpoint advances only after a successful run

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cloud;
mod config;
mod descriptor;
mod dropbox;
mod error;
mod event;
mod http;
mod local;
mod plan;
mod replicator;
mod settings;

pub use cloud::{CloudService, DirectoryCloud, MemoryCloud};
pub use config::{SyncConfig, DEFAULT_CONFLICT_SUFFIX};
pub use descriptor::{FileDescriptor, FileHandle, FileSet, Side};
pub use dropbox::DropboxCloud;
pub use error::{SyncError, SyncResult};
pub use event::{
    ChannelObserver, Event, EventType, ObserverError, ObserverList, ObserverResult,
    ReplicatorObserver,
};
pub use http::{HttpClient, HttpRequest, HttpResponse, ScriptedClient};
pub use local::{is_reserved_name, validate_name, LocalFileSystem};
pub use plan::{first_sync, incremental, Action, Plan, SyncMode};
pub use replicator::{
    Replicator, ReplicatorStats, RunGuard, RunLatch, RunOutcome, RunReport,
};
pub use settings::{FileSettings, MemorySettings, NotesManager, SettingsData, SettingsStore};
