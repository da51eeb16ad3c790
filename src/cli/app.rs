//! Main CLI application structure

use clap::{Parser, Subcommand};
use anyhow::Result;

use super::output::{Output, OutputFormat};
use super::{check, daemon};
use crate::storage::Workspace;

#[derive(Parser)]
#[command(name = "typings")]
#[command(author, version, about = "Keeps @types packages in sync with package.json dependencies")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text", env = "TYPINGS_FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a typings workspace
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Scan the workspace and report dependencies without typings
    Check {
        /// Install the missing typings in active projects
        #[arg(long)]
        install: bool,
    },

    /// Manage the background daemon
    #[command(subcommand)]
    Daemon(daemon::DaemonCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(cli.format, cli.verbose);

    output.verbose("typings starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing workspace at: {}", path));
            let workspace = Workspace::init(&path)?;
            output.verbose_ctx(
                "init",
                &format!("Created state directory at: {}", workspace.state_dir().display()),
            );
            output.success(&format!(
                "Initialized typings workspace at {}",
                workspace.root().display()
            ));
        }

        Commands::Check { install } => check::run(&output, install)?,

        Commands::Daemon(cmd) => daemon::run(cmd, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}
