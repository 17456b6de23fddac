//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Webhook relay turning time-tracker entries into issue tracker worklogs.
///
/// Listens for time entry notifications, splits long entries into regular
/// and overtime portions, and posts them to the configured targets.
#[derive(Debug, Parser)]
#[command(name = "worklog-relay", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the webhook listener (default).
    Serve,

    /// Print the worklogs a webhook event would produce, without sending them.
    Plan {
        /// File holding one webhook body as JSON, or `-` for stdin.
        file: PathBuf,
    },

    /// Print the effective configuration with secrets redacted.
    ShowConfig,
}
