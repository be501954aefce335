pub mod config;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// htriage: symptom triage with remote and on-device inference.
#[derive(Debug, Parser)]
#[command(name = "htriage", version, about)]
pub struct Cli {
    /// Path to the config file (defaults to `HT_CONFIG` or `htriage.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Assess one submission and print the result as JSON.
    Run {
        /// Symptom description.
        #[arg(long)]
        text: Option<String>,
        /// Image file to attach.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Load the on-device model first and prefer it for text.
        #[arg(long)]
        offline: bool,
    },
    /// List stored sessions, newest first.
    History {
        /// Maximum number of sessions (defaults to `store.history_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List sessions that have not reached the remote service.
    Unsynced,
    /// Replay unsynced sessions against the remote service.
    Sync,
    /// On-device model management.
    #[command(subcommand)]
    Model(ModelCommand),
    /// Delete every stored session.
    Clear,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    /// Download (if needed) and load the model, printing progress.
    Load,
    /// Report device capability and model status.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path: `--config`, then `HT_CONFIG`, then
/// `htriage.toml` in the working directory.
pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("HT_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("htriage.toml"))
}
