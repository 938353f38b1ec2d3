//! Status command implementation.

use super::{CliError, Context};
use chrono::SecondsFormat;
use filenotes_sync::{LocalFileSystem, NotesManager, SettingsStore};
use serde::Serialize;
use std::path::Path;

/// Replication status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Notes directory.
    pub notes_dir: String,
    /// Settings document.
    pub settings: String,
    /// Last successful run, RFC 3339.
    pub last_sync: Option<String>,
    /// Dirty bit.
    pub replication_required: bool,
    /// Files in the notes directory.
    pub local_files: usize,
    /// Whether a Dropbox token is stored.
    pub logged_in: bool,
}

/// Runs the status command.
pub fn run(notes_dir: &Path, settings_path: &Path, format: &str) -> Result<(), CliError> {
    let context = Context::open_read_only(notes_dir, settings_path)?;
    let settings = &context.settings;

    let local_files = match LocalFileSystem::open_dir(notes_dir, false) {
        Ok(local) => local.files()?.len(),
        Err(_) => 0,
    };

    let result = StatusResult {
        notes_dir: notes_dir.display().to_string(),
        settings: settings_path.display().to_string(),
        last_sync: settings
            .last_sync()?
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        replication_required: settings.replication_required(),
        local_files,
        logged_in: settings.access_token().is_some(),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text(&result);
    }

    Ok(())
}

fn print_text(result: &StatusResult) {
    println!("Notes directory:      {}", result.notes_dir);
    println!("Settings:             {}", result.settings);
    println!(
        "Last sync:            {}",
        result.last_sync.as_deref().unwrap_or("never")
    );
    println!("Replication required: {}", result.replication_required);
    println!("Local files:          {}", result.local_files);
    println!("Logged in:            {}", result.logged_in);
}
