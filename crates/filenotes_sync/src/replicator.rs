//! The reconciler.
//!
//! One [`Replicator::invoke`] call is one run:
//!
//! 1. enumerate the notes directory, then the remote folder;
//! 2. plan with the first-sync or incremental table, depending on whether a
//!    checkpoint exists;
//! 3. apply the plan in order, raising one event per applied operation;
//! 4. on clean completion, store "now" as the checkpoint and clear the
//!    replication-required flag.
//!
//! The checkpoint is taken after the transfers because downloads stamp local
//! files with a time inside the run; a later checkpoint keeps them from
//! looking changed on the next run. When anything fails the checkpoint stays
//! where it was and the operations already applied are kept, so the next
//! run re-enters the same algorithm.

use crate::cloud::CloudService;
use crate::config::SyncConfig;
use crate::descriptor::FileDescriptor;
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventType, ObserverList, ReplicatorObserver};
use crate::plan::{Action, Plan, SyncMode};
use crate::settings::{NotesManager, SettingsStore};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// At-most-one-run latch.
///
/// [`RunLatch::global`] is shared by every replicator in the process unless
/// one is given its own latch with [`Replicator::with_latch`].
#[derive(Debug, Default)]
pub struct RunLatch {
    running: AtomicBool,
}

impl RunLatch {
    /// Creates a released latch.
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    /// The process-wide latch.
    pub fn global() -> Arc<RunLatch> {
        static GLOBAL: OnceLock<Arc<RunLatch>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(RunLatch::new())))
    }

    /// Takes the latch, or returns `None` if a run is in flight.
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard { latch: self })
    }

    /// True while a run holds the latch.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Releases its [`RunLatch`] when dropped, on every exit path.
#[derive(Debug)]
pub struct RunGuard<'a> {
    latch: &'a RunLatch,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.latch.running.store(false, Ordering::SeqCst);
    }
}

/// What one run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Algorithm used.
    pub mode: SyncMode,
    /// Remote files fetched into the notes directory.
    pub downloads: Vec<FileDescriptor>,
    /// Local files copied to the remote folder.
    pub uploads: Vec<FileDescriptor>,
    /// Local files removed.
    pub local_deletes: Vec<FileDescriptor>,
    /// Remote files removed.
    pub remote_deletes: Vec<FileDescriptor>,
    /// Names of the conflict copies written locally.
    pub conflicts: Vec<String>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl RunReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            downloads: Vec::new(),
            uploads: Vec::new(),
            local_deletes: Vec::new(),
            remote_deletes: Vec::new(),
            conflicts: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Applied modifications; equals the number of events raised.
    pub fn update_count(&self) -> usize {
        self.downloads.len() + self.uploads.len() + self.local_deletes.len() + self.remote_deletes.len()
    }
}

/// Result of [`Replicator::invoke`].
#[derive(Debug)]
pub enum RunOutcome {
    /// Both sides were reconciled and the checkpoint advanced.
    Completed(RunReport),
    /// The run stopped at the first error; applied operations are kept.
    Failed {
        /// The error that ended the run.
        error: SyncError,
        /// Work done before the error.
        report: RunReport,
    },
    /// The cloud service has no session; nothing was done.
    NotAuthenticated,
    /// Another run held the latch; nothing was done.
    AlreadyRunning,
}

impl RunOutcome {
    /// True for [`RunOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// Report of a run that started.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) | RunOutcome::Failed { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Error of a failed run.
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            RunOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Cumulative statistics across runs.
#[derive(Debug, Clone, Default)]
pub struct ReplicatorStats {
    /// Runs that completed.
    pub runs_completed: u64,
    /// Runs that stopped on an error.
    pub runs_failed: u64,
    /// Invocations skipped (not authenticated or already running).
    pub runs_skipped: u64,
    /// Total applied modifications.
    pub updates_applied: u64,
    /// Total conflict copies written.
    pub conflicts_resolved: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Reconciles the notes directory with a cloud folder.
pub struct Replicator<C: CloudService, S: SettingsStore, N: NotesManager> {
    config: SyncConfig,
    cloud: Arc<C>,
    settings: Arc<S>,
    notes: Arc<N>,
    observers: ObserverList,
    latch: Arc<RunLatch>,
    last_report: RwLock<Option<RunReport>>,
    stats: RwLock<ReplicatorStats>,
}

impl<C: CloudService, S: SettingsStore, N: NotesManager> Replicator<C, S, N> {
    /// Creates a replicator guarded by the process-wide latch.
    pub fn new(config: SyncConfig, cloud: Arc<C>, settings: Arc<S>, notes: Arc<N>) -> Self {
        Self {
            config,
            cloud,
            settings,
            notes,
            observers: ObserverList::new(),
            latch: RunLatch::global(),
            last_report: RwLock::new(None),
            stats: RwLock::new(ReplicatorStats::default()),
        }
    }

    /// Uses `latch` instead of the process-wide one.
    pub fn with_latch(mut self, latch: Arc<RunLatch>) -> Self {
        self.latch = latch;
        self
    }

    /// The cloud service.
    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    /// The settings store.
    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// The notes manager.
    pub fn notes(&self) -> &N {
        &self.notes
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The latch guarding runs.
    pub fn latch(&self) -> &RunLatch {
        &self.latch
    }

    /// Registers an observer. Observers are notified in registration order.
    pub fn add_observer<O: ReplicatorObserver + 'static>(&self, observer: O) {
        self.observers.add(Arc::new(observer));
    }

    /// Applied modifications of the most recent run, 0 before any run.
    pub fn update_count(&self) -> usize {
        self.last_report
            .read()
            .as_ref()
            .map_or(0, RunReport::update_count)
    }

    /// Report of the most recent run that started.
    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().clone()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> ReplicatorStats {
        self.stats.read().clone()
    }

    /// Computes what the next run would do, without applying anything.
    pub fn preview(&self) -> SyncResult<Plan> {
        if !self.cloud.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }
        let local = self.cloud.local().files()?;
        let remote = self.cloud.files()?;
        Ok(Plan::build(&local, &remote, self.settings.last_sync()?))
    }

    /// Runs one reconciliation. Never panics and never returns an error;
    /// the outcome says what happened.
    pub fn invoke(&self) -> RunOutcome {
        let Some(_guard) = self.latch.try_acquire() else {
            debug!("invoke: already running");
            self.stats.write().runs_skipped += 1;
            return RunOutcome::AlreadyRunning;
        };

        info!("invoke");

        if !self.cloud.is_authenticated() {
            info!("invoke: not authenticated, skipping");
            self.stats.write().runs_skipped += 1;
            return RunOutcome::NotAuthenticated;
        }

        let start = Instant::now();
        let mut report = RunReport::new(SyncMode::FirstSync);
        let result = self.run(&mut report);
        report.duration = start.elapsed();

        *self.last_report.write() = Some(report.clone());

        let mut stats = self.stats.write();
        stats.updates_applied += report.update_count() as u64;
        stats.conflicts_resolved += report.conflicts.len() as u64;

        match result {
            Ok(()) => {
                info!(
                    "invoke: complete, {} updates, {} conflicts in {:?}",
                    report.update_count(),
                    report.conflicts.len(),
                    report.duration
                );
                stats.runs_completed += 1;
                stats.last_error = None;
                RunOutcome::Completed(report)
            }
            Err(e) => {
                error!(
                    "invoke: failed after {} updates: {}",
                    report.update_count(),
                    e
                );
                stats.runs_failed += 1;
                stats.last_error = Some(e.to_string());
                RunOutcome::Failed { error: e, report }
            }
        }
    }

    fn run(&self, report: &mut RunReport) -> SyncResult<()> {
        let last_sync = self.settings.last_sync()?;
        report.mode = SyncMode::from_last_sync(last_sync);

        let local = self.cloud.local().files()?;
        let remote = self.cloud.files()?;

        let plan = Plan::build(&local, &remote, last_sync);
        match plan.mode {
            SyncMode::FirstSync => debug!("first sync"),
            SyncMode::Incremental(since) => {
                debug!("sync (previous success: {})", since.to_rfc3339())
            }
        }

        for action in plan.actions {
            self.apply(action, report)?;
        }

        // The checkpoint is written last; if it fails, the flag is restored
        // so neither value moves.
        self.notes.set_replication_required(false)?;
        if let Err(e) = self.settings.set_last_sync(Utc::now()) {
            if let Err(restore) = self.notes.set_replication_required(true) {
                warn!("could not restore replication flag: {}", restore);
            }
            return Err(e);
        }
        Ok(())
    }

    fn apply(&self, action: Action, report: &mut RunReport) -> SyncResult<()> {
        match action {
            Action::Download(remote) => {
                info!("download({})", remote.name);
                self.cloud.download(&remote, None)?;
                let event = Event::new(EventType::LocalUpdate, remote.path.clone());
                report.downloads.push(remote);
                self.observers.broadcast(&event);
            }
            Action::Upload(local) => {
                info!("upload({})", local.name);
                self.cloud.upload(&local)?;
                let event = Event::new(EventType::RemoteUpdate, local.path.clone());
                report.uploads.push(local);
                self.observers.broadcast(&event);
            }
            Action::DeleteLocal(local) => {
                info!("deleteLocal({})", local.name);
                self.cloud.local().delete(&local.name)?;
                let event = Event::new(EventType::LocalDelete, local.path.clone());
                report.local_deletes.push(local);
                self.observers.broadcast(&event);
            }
            Action::DeleteRemote(remote) => {
                info!("deleteRemote({})", remote.name);
                self.cloud.delete(&remote)?;
                let event = Event::new(EventType::RemoteDelete, remote.path.clone());
                report.remote_deletes.push(remote);
                self.observers.broadcast(&event);
            }
            Action::ResolveConflict { local, remote } => {
                // The local file stays; the remote one lands beside it. The
                // copy is an ordinary file from the next enumeration on.
                let name = self.config.conflict_name(&local.name);
                info!("resolveConflict({} -> {})", remote.name, name);
                self.cloud.download(&remote, Some(&name))?;
                report.conflicts.push(name);
            }
        }
        Ok(())
    }
}
