//! Plan command implementation.

use super::{CliError, Context, RemoteArgs};
use filenotes_sync::{Action, SyncMode};
use std::path::Path;

/// Runs the plan command: prints the next run's decisions without applying
/// them.
pub fn run(notes_dir: &Path, settings_path: &Path, remote: &RemoteArgs) -> Result<(), CliError> {
    let context = Context::open_read_only(notes_dir, settings_path)?;
    let replicator = context.replicator(context.remote(remote)?);
    let plan = replicator.preview()?;

    match plan.mode {
        SyncMode::FirstSync => println!("First sync (no deletes)"),
        SyncMode::Incremental(since) => {
            println!("Incremental sync since {}", since.to_rfc3339())
        }
    }

    if plan.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    for action in &plan.actions {
        match action {
            Action::ResolveConflict { local, .. } => println!(
                "{:>14}  {} -> {}",
                action.verb(),
                local.name,
                context.config.conflict_name(&local.name)
            ),
            _ => println!("{:>14}  {}", action.verb(), action.name()),
        }
    }
    println!("{} actions", plan.len());

    Ok(())
}
