//! CLI argument parsing for sl

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sl")]
#[command(
    author,
    version,
    about = "Single-instance launch coordination",
    long_about = None,
    after_help = "Logs are written to: ~/.local/share/singlelaunch/logs/singlelaunch.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the coordination record path
    #[arg(short, long, global = true)]
    pub record_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show which application holds the slot
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove the coordination record, freeing the slot
    Clear,

    /// Print the resolved record path
    Path,

    /// Run an in-process hand-off between two demo applications
    Demo {
        /// Name of the application launched first
        #[arg(long, default_value = "Demo app 1")]
        first: String,

        /// Name of the application that replaces it
        #[arg(long, default_value = "Demo app 2")]
        second: String,

        /// Settle delay in milliseconds (defaults to the configured value)
        #[arg(short, long)]
        settle_delay_ms: Option<u64>,
    },
}

/// Output format for `show`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
