//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::changeset::{self, ChangesetCommands};
use super::output::{Output, OutputFormat};
use crate::logging;
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about = "Changeset staging for layered architecture models")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new strata project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage changesets
    #[command(subcommand)]
    Changeset(ChangesetCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let global = Config::load().map(|c| c.global).unwrap_or_default();
    logging::init(cli.verbose, global.log_format);

    let format = cli.format.unwrap_or_else(|| global.default_format.into());
    let output = Output::new(format);

    tracing::debug!(?format, "strata starting");

    match cli.command {
        Commands::Init { path } => {
            let project = Project::init(&path)?;
            tracing::debug!(dir = %project.strata_dir().display(), "created project directory");
            output.success(&format!(
                "Initialized strata project at {}",
                project.root().display()
            ));
        }

        Commands::Changeset(cmd) => changeset::run(cmd, &output)?,
    }

    tracing::debug!("command completed");
    Ok(())
}
