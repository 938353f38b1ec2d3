//! Watch command implementation.

use super::sync::{print_event, report};
use super::{CliError, Context, RemoteArgs};
use filenotes_sync::NotesManager;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How often the dirty bit is checked.
const POLL: Duration = Duration::from_secs(1);

/// Runs the watch command.
///
/// A run starts when the interval has elapsed since the previous one, or
/// sooner when the settings document asks for replication. After a failed
/// run only the interval triggers the next attempt.
pub fn run(
    notes_dir: &Path,
    settings_path: &Path,
    remote: &RemoteArgs,
    interval: u64,
    max_runs: Option<u64>,
) -> Result<(), CliError> {
    let context = Context::open(notes_dir, settings_path)?;
    let replicator = context.replicator(context.remote(remote)?);
    replicator.add_observer(print_event);

    let interval = Duration::from_secs(interval.max(1));
    let mut runs = 0u64;
    let mut last_run: Option<Instant> = None;
    let mut last_failed = false;

    info!("watch: every {:?}", interval);

    loop {
        if let Err(e) = context.settings.reload() {
            warn!("watch: could not reload settings: {}", e);
        }

        let due = last_run.map_or(true, |at| at.elapsed() >= interval);
        let requested = !last_failed && context.settings.replication_required();

        if due || requested {
            match report(replicator.invoke()) {
                Ok(()) => last_failed = false,
                Err(CliError::RunFailed(e)) => {
                    error!("watch: {}", e);
                    last_failed = true;
                }
                Err(e) => return Err(e),
            }

            runs += 1;
            last_run = Some(Instant::now());
            if max_runs.is_some_and(|max| runs >= max) {
                return Ok(());
            }
        }

        thread::sleep(POLL.min(interval));
    }
}
