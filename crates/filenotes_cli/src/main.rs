//! Filenotes CLI
//!
//! Command-line replication between a notes directory and a cloud folder.
//!
//! # Commands
//!
//! - `sync` - Run one replication
//! - `plan` - Show what the next replication would do
//! - `status` - Display checkpoint and session state
//! - `login` / `logout` - Manage the Dropbox session
//! - `watch` - Replicate repeatedly

mod commands;

use clap::{Parser, Subcommand};
use commands::RemoteArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Filenotes command-line replicator.
#[derive(Parser)]
#[command(name = "filenotes")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the notes directory
    #[arg(global = true, short, long, env = "FILENOTES_NOTES_DIR", default_value = "notes")]
    notes_dir: PathBuf,

    /// Path to the settings document
    #[arg(global = true, short, long, env = "FILENOTES_SETTINGS", default_value = "filenotes.json")]
    settings: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one replication
    Sync {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Show what the next replication would do
    Plan {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Display checkpoint and session state
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Store a Dropbox access token
    Login {
        /// Access token; without one the authorization URL is printed
        #[arg(short, long)]
        token: Option<String>,

        /// Dropbox application key
        #[arg(long, env = "FILENOTES_DROPBOX_APP_KEY", default_value = commands::DEFAULT_APP_KEY)]
        app_key: String,
    },

    /// Forget the Dropbox access token
    Logout,

    /// Replicate repeatedly
    Watch {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Seconds between unrequested runs
        #[arg(short, long, default_value = "300")]
        interval: u64,

        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<u64>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync { remote } => {
            commands::sync::run(&cli.notes_dir, &cli.settings, &remote)?;
        }
        Commands::Plan { remote } => {
            commands::plan::run(&cli.notes_dir, &cli.settings, &remote)?;
        }
        Commands::Status { format } => {
            commands::status::run(&cli.notes_dir, &cli.settings, &format)?;
        }
        Commands::Login { token, app_key } => {
            commands::login::login(&cli.notes_dir, &cli.settings, token.as_deref(), &app_key)?;
        }
        Commands::Logout => {
            commands::login::logout(&cli.settings)?;
        }
        Commands::Watch {
            remote,
            interval,
            max_runs,
        } => {
            commands::watch::run(&cli.notes_dir, &cli.settings, &remote, interval, max_runs)?;
        }
        Commands::Version => {
            println!("Filenotes CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
