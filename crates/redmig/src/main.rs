//! redmig CLI - Redmine wiki and issue migration.
//!
//! Provides commands for:
//! - `export-wiki`: Export Redmine wiki pages with their files
//! - `import-confluence`: Create Confluence pages from an export
//! - `import-jira`: Create Jira issues from an issue export

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ExportWikiArgs, ImportConfluenceArgs, ImportJiraArgs};
use output::Output;

/// redmig - Redmine to Confluence and Jira migration.
#[derive(Parser)]
#[command(name = "redmig", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the wiki of a Redmine project.
    ExportWiki(ExportWikiArgs),
    /// Import exported wiki pages into Confluence.
    ImportConfluence(ImportConfluenceArgs),
    /// Import exported issues into Jira.
    ImportJira(ImportJiraArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::ExportWiki(args) => args.verbose,
            Self::ImportConfluence(args) => args.verbose,
            Self::ImportJira(args) => args.verbose,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.command.verbose() {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::ExportWiki(args) => args.execute(),
        Commands::ImportConfluence(args) => args.execute(),
        Commands::ImportJira(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
