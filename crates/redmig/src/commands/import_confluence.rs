//! `redmig import-confluence` command implementation.

use std::path::PathBuf;

use clap::Args;
use redmig_config::{CliSettings, Config};
use redmig_confluence::{ConfluenceClient, ConfluenceTarget, WikiImporter};
use redmig_sequencer::AssetFetcher;
use redmig_source::{ExportStore, RedmineAuth, RedmineClient};
use tracing::debug;

use super::{flag, incomplete, print_report, timeout};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the import-confluence command.
#[derive(Args)]
pub(crate) struct ImportConfluenceArgs {
    /// Export directory to read pages from (overrides config).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Import only these pages, comma separated.
    #[arg(long, value_delimiter = ',')]
    pages: Vec<String>,

    /// Delete and recreate pages that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Stop at the first page that fails.
    #[arg(long)]
    fail_fast: bool,

    /// Write the assembled pages as HTML files next to the export instead of
    /// publishing.
    #[arg(long)]
    dry_run: bool,

    /// Path to configuration file (default: auto-discover redmig.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl ImportConfluenceArgs {
    /// Execute the import command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the export cannot be
    /// read, the space cannot be resolved, or any page was not migrated.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let settings = CliSettings {
            export_dir: self.input,
            fail_fast: flag(self.fail_fast),
            overwrite: flag(self.overwrite),
        };
        let config = Config::load(self.config.as_deref(), Some(&settings))?;
        debug!(config = ?config.config_path, "Configuration loaded");
        let confluence = config.require_confluence()?;
        let store = ExportStore::new(config.export_dir.clone());

        // Remote images missing from the export are fetched from Redmine
        // when credentials are configured.
        let redmine = config.redmine.as_ref().and_then(|r| {
            let auth = RedmineAuth::from_parts(r.api_key.as_deref(), r.session_cookie.as_deref())?;
            Some(RedmineClient::new(&r.base_url, &r.project, auth, timeout(&config)))
        });

        let mut importer = WikiImporter::from_config(&store, &config)?;
        if !self.pages.is_empty() {
            importer = importer.pages(self.pages);
        }
        if let Some(client) = &redmine {
            importer = importer.fetcher(client as &dyn AssetFetcher);
        }

        output.info(&format!(
            "Assembling pages from {}...",
            config.export_dir.display()
        ));
        let pages = importer.prepare()?;
        let unresolved: usize = pages.iter().map(|p| p.unresolved.len()).sum();
        output.count("Pages", pages.len());
        output.count("Unresolved images", unresolved);

        if self.dry_run {
            let written = importer.dry_run(&pages)?;
            output.success(&format!("Wrote {} HTML files", written.len()));
            return Ok(());
        }

        let client = ConfluenceClient::new(
            &confluence.base_url,
            &confluence.user,
            &confluence.api_token,
            timeout(&config),
        );
        let space = client.get_space(&confluence.space_key)?;
        let root_parent = match &confluence.parent_folder {
            Some(folder) => Some(client.folder_id(&space, folder)?),
            None => space.homepage_id.clone(),
        };
        debug!(space = %space.id, parent = ?root_parent, "Resolved placement");

        output.highlight(&format!("Publishing to space {}...", confluence.space_key));
        let target = ConfluenceTarget::new(&client, space.id.clone(), importer.titles().clone())
            .full_width(confluence.full_width);
        let report = importer.publish(&target, &pages, root_parent)?;

        print_report(&output, &report);
        if report.is_clean() {
            Ok(())
        } else {
            Err(CliError::Incomplete(incomplete(&report, "pages")))
        }
    }
}
