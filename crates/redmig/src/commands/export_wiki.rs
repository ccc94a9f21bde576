//! `redmig export-wiki` command implementation.

use std::path::PathBuf;

use clap::Args;
use redmig_config::{CliSettings, Config, ConfigError};
use redmig_source::{ExportReport, ExportStore, RedmineAuth, RedmineClient, WikiExporter};
use tracing::debug;

use super::{flag, timeout};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the export-wiki command.
#[derive(Args)]
pub(crate) struct ExportWikiArgs {
    /// Directory the export is written to (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Page titles to leave out, comma separated (added to config).
    #[arg(long, value_delimiter = ',')]
    skip_pages: Vec<String>,

    /// Stop at the first page that fails.
    #[arg(long)]
    fail_fast: bool,

    /// Path to configuration file (default: auto-discover redmig.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl ExportWikiArgs {
    /// Execute the export command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, the page list cannot be
    /// read, or any page or file failed to export.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let settings = CliSettings {
            export_dir: self.output_dir,
            fail_fast: flag(self.fail_fast),
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&settings))?;
        debug!(config = ?config.config_path, "Configuration loaded");
        let redmine = config.require_redmine()?;

        let auth = RedmineAuth::from_parts(
            redmine.api_key.as_deref(),
            redmine.session_cookie.as_deref(),
        )
        .ok_or_else(|| {
            CliError::Config(ConfigError::Validation(
                "redmine.api_key or redmine.session_cookie must be set".to_owned(),
            ))
        })?;
        let client = RedmineClient::new(
            &redmine.base_url,
            &redmine.project,
            auth,
            timeout(&config),
        );
        let store = ExportStore::new(config.export_dir.clone());

        output.info(&format!(
            "Exporting wiki of '{}' to {}...",
            redmine.project,
            config.export_dir.display()
        ));
        let report = WikiExporter::new(&client, &store)
            .skip_pages(redmine.skip_pages.iter().cloned().chain(self.skip_pages))
            .base_url(redmine.base_url.clone())
            .fail_fast(config.publish.fail_fast)
            .run()?;

        print_export_report(&output, &report);
        if report.failures.is_empty() {
            Ok(())
        } else {
            Err(CliError::Incomplete(format!(
                "{} export failures",
                report.failures.len()
            )))
        }
    }
}

fn print_export_report(output: &Output, report: &ExportReport) {
    output.separator();
    output.success(&format!("Exported pages: {}", report.exported.len()));
    output.count("Skipped pages", report.skipped.len());
    output.count("Attachments", report.attachments);
    output.count("Embedded images", report.images);

    if !report.failures.is_empty() {
        output.error(&format!("\nFailures ({}):", report.failures.len()));
        for failure in &report.failures {
            match &failure.item {
                Some(item) => output.item(&format!("{} / {item}: {}", failure.page, failure.error)),
                None => output.item(&format!("{}: {}", failure.page, failure.error)),
            }
        }
    }
    if report.halted {
        output.warning("\nStopped after the first failed page.");
    }
}
