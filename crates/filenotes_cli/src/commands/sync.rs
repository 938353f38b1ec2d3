//! Sync command implementation.

use super::{CliError, Context, RemoteArgs};
use chrono::SecondsFormat;
use filenotes_sync::{Event, ObserverResult, RunOutcome, RunReport, SyncMode};
use std::path::Path;

/// Runs the sync command.
pub fn run(notes_dir: &Path, settings_path: &Path, remote: &RemoteArgs) -> Result<(), CliError> {
    let context = Context::open(notes_dir, settings_path)?;
    let replicator = context.replicator(context.remote(remote)?);
    replicator.add_observer(print_event);

    report(replicator.invoke())
}

/// Prints one replication event.
pub fn print_event(event: &Event) -> ObserverResult {
    println!("{}", event);
    Ok(())
}

/// Prints the outcome of a run.
pub fn report(outcome: RunOutcome) -> Result<(), CliError> {
    match outcome {
        RunOutcome::Completed(report) => {
            print_summary("Synced", &report);
            Ok(())
        }
        RunOutcome::Failed { error, report } => {
            print_summary("Stopped", &report);
            Err(CliError::RunFailed(error))
        }
        RunOutcome::NotAuthenticated => Err(CliError::NotAuthenticated),
        RunOutcome::AlreadyRunning => {
            println!("A replication is already running.");
            Ok(())
        }
    }
}

fn print_summary(verb: &str, report: &RunReport) {
    for name in &report.conflicts {
        println!("Conflict: remote version kept as {}", name);
    }

    let mode = match report.mode {
        SyncMode::FirstSync => "first sync".to_string(),
        SyncMode::Incremental(since) => {
            format!("since {}", since.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
    };
    println!(
        "{} ({}): {} downloaded, {} uploaded, {} deleted locally, {} deleted remotely, {} conflicts in {:.2?}",
        verb,
        mode,
        report.downloads.len(),
        report.uploads.len(),
        report.local_deletes.len(),
        report.remote_deletes.len(),
        report.conflicts.len(),
        report.duration
    );
}
