//! CLI definition and command handling

pub mod commands;
pub mod output;
mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{
    BuildCommand, CleanCommand, ClonesCommand, DevicesCommand, MultiScanCommand, RuntimesCommand,
    ScanCommand,
};

pub use session::Session;

/// Launchpad - parallel iOS simulator test orchestration
#[derive(Debug, Parser)]
#[command(name = "launchpad")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (searched for from the working directory otherwise)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List installed simulator runtimes
    Runtimes(RuntimesCommand),

    /// List simulators
    Devices(DevicesCommand),

    /// Run the whole suite on the reference simulator
    Scan(ScanCommand),

    /// Build once and split the suite across simulator clones
    MultiScan(MultiScanCommand),

    /// Manage simulator clones
    Clones(ClonesCommand),

    /// Build the scheme
    Build(BuildCommand),

    /// Remove derived data and, optionally, clones
    Clean(CleanCommand),
}

impl Cli {
    /// Execute the CLI command and return the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Runtimes(ref cmd) => cmd.execute(&self),
            Commands::Devices(ref cmd) => cmd.execute(&self),
            Commands::Scan(ref cmd) => cmd.execute(&self),
            Commands::MultiScan(ref cmd) => cmd.execute(&self),
            Commands::Clones(ref cmd) => cmd.execute(&self),
            Commands::Build(ref cmd) => cmd.execute(&self),
            Commands::Clean(ref cmd) => cmd.execute(&self),
        }
    }

    /// Whether human-readable progress should be printed
    pub fn shows_progress(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }
}
