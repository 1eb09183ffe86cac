//! Subcommand surface, parsed with `clap`'s derive API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tenangdb", version, about = "MySQL backup orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the backup orchestrator for some or all configured databases.
    Backup {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Restrict the run to these databases; defaults to all configured.
        #[arg(long)]
        database: Vec<String>,
        /// Bypass the frequency guard regardless of recency.
        #[arg(long)]
        force: bool,
        /// Non-interactive mode: a Prompt verdict becomes Block.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Restore a snapshot into a target database.
    Restore {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        artifact_path: PathBuf,
        target_database: String,
        /// Required to overwrite an existing non-empty target non-interactively.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Run the cleanup engine once.
    Cleanup {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        database: Vec<String>,
        #[arg(long)]
        max_age_days: Option<u32>,
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Run the long-lived metrics exporter daemon.
    Exporter {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print version and build metadata.
    Version,
}
