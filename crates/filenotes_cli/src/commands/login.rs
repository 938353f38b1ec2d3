//! Login and logout command implementations.

use super::{lock_settings, CliError, Context};
use filenotes_sync::{CloudService, FileSettings, SettingsStore};
use std::path::Path;
use tracing::info;

/// Runs the login command.
///
/// With a token, stores it. Without one, prints where to get one.
pub fn login(
    notes_dir: &Path,
    settings_path: &Path,
    token: Option<&str>,
    app_key: &str,
) -> Result<(), CliError> {
    let context = Context::open(notes_dir, settings_path)?;
    let dropbox = context.dropbox(&context.config, context.local()?, app_key)?;

    match token {
        Some(token) => {
            dropbox.complete_login(token)?;
            info!("login: token stored in {}", settings_path.display());
            println!("Logged in.");
        }
        None if dropbox.is_authenticated() => {
            println!("Already logged in.");
        }
        None => {
            println!("Open this URL, approve access, then run");
            println!("`filenotes login --token <TOKEN>`:");
            println!();
            println!("  {}", dropbox.authorize_url());
        }
    }

    Ok(())
}

/// Runs the logout command.
pub fn logout(settings_path: &Path) -> Result<(), CliError> {
    let _lock = lock_settings(settings_path)?;
    let settings = FileSettings::open(settings_path)?;

    if settings.access_token().is_none() {
        println!("Not logged in.");
        return Ok(());
    }

    settings.clear_access_token()?;
    info!("logout: token removed from {}", settings_path.display());
    println!("Logged out.");
    Ok(())
}
