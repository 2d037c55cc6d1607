//! notesync CLI
//!
//! Command-line client that keeps a local note file in sync with a notes
//! server.
//!
//! # Commands
//!
//! - `get` - Print the synchronized value of a note
//! - `watch` - Print every change to a note until interrupted
//! - `save` - Save a note locally and push it to the server
//! - `list` - List locally stored notes
//! - `delete` - Delete a note from the local store

mod client;
mod commands;
mod session;

use clap::{Parser, Subcommand};
use notesync_engine::{NoteStore, SyncConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT};
use session::Session;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Keep notes in sync with a notes server.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the notes server
    #[arg(global = true, short, long, env = "NOTESYNC_URL")]
    url: Option<String>,

    /// Path to the local note file
    #[arg(global = true, short, long, env = "NOTESYNC_STORE", default_value = "notes.json")]
    store: PathBuf,

    /// Poll interval in milliseconds
    #[arg(global = true, long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    interval_ms: u64,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the synchronized value of a note
    Get {
        /// Note title
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print every change to a note until interrupted
    Watch {
        /// Note title
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Save a note locally and push it to the server
    Save {
        /// Note title
        key: String,

        /// Note content
        content: String,
    },

    /// List locally stored notes
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a note from the local store
    Delete {
        /// Note title
        key: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn config(&self) -> Result<SyncConfig, Box<dyn std::error::Error>> {
        let url = self
            .url
            .clone()
            .ok_or("server URL required (--url or NOTESYNC_URL)")?;
        let config = SyncConfig::new(url)
            .with_poll_interval(Duration::from_millis(self.interval_ms))
            .with_request_timeout(Duration::from_secs(self.timeout_secs));
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Get { key, format } => {
            let session = Session::open(cli.config()?, &cli.store)?;
            commands::get::run(&session, key, format)?;
        }
        Commands::Watch { key, format } => {
            let session = Session::open(cli.config()?, &cli.store)?;
            commands::watch::run(&session, key, format)?;
        }
        Commands::Save { key, content } => {
            let session = Session::open(cli.config()?, &cli.store)?;
            commands::save::run(&session, key, content)?;
        }
        Commands::List { format } => {
            commands::list::run(&NoteStore::open(&cli.store)?, format)?;
        }
        Commands::Delete { key } => {
            commands::delete::run(&NoteStore::open(&cli.store)?, key)?;
        }
        Commands::Version => {
            println!("notesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
