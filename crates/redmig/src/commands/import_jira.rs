//! `redmig import-jira` command implementation.

use std::path::PathBuf;

use clap::Args;
use redmig_config::{CliSettings, Config};
use redmig_jira::{
    IssueImporter, JiraClient, JiraLookups, JiraTarget, failed_issue_ids, load_user_map,
    write_error_log,
};
use redmig_source::ExportStore;
use tracing::debug;

use super::{flag, incomplete, print_report, timeout};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the import-jira command.
#[derive(Args)]
pub(crate) struct ImportJiraArgs {
    /// Export directory to read issues from (overrides config).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// CSV mapping Redmine user names to Jira emails.
    #[arg(long)]
    emails: Option<PathBuf>,

    /// File the ids of issues that failed are appended to.
    #[arg(long, default_value = "import-errors.log")]
    errorlog: PathBuf,

    /// Leave out issues that are closed or rejected in Redmine.
    #[arg(long)]
    skip_closed: bool,

    /// Import a single issue.
    #[arg(long)]
    issue_id: Option<u64>,

    /// Delete and recreate issues that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Stop at the first issue that fails.
    #[arg(long)]
    fail_fast: bool,

    /// Path to configuration file (default: auto-discover redmig.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl ImportJiraArgs {
    /// Execute the import command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid, a configured field does
    /// not exist, or any issue was not migrated.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let settings = CliSettings {
            export_dir: self.input,
            fail_fast: flag(self.fail_fast),
            overwrite: flag(self.overwrite),
        };
        let config = Config::load(self.config.as_deref(), Some(&settings))?;
        debug!(config = ?config.config_path, "Configuration loaded");
        let jira = config.require_jira()?;
        let store = ExportStore::new(config.export_dir.clone());

        let client = JiraClient::new(&jira.base_url, &jira.user, &jira.api_token, timeout(&config));
        let mut lookups = JiraLookups::from_client(&client)?;
        if let Some(path) = &self.emails {
            let map = load_user_map(path)?;
            output.count("Mapped users", map.len());
            lookups = lookups.with_user_map(map);
        }

        let importer = IssueImporter::from_config(&store, &config)?
            .skip_closed(self.skip_closed)
            .issue_id(self.issue_id);

        output.info(&format!(
            "Preparing issues from {}...",
            config.export_dir.display()
        ));
        let preparation = importer.prepare(&lookups)?;
        output.count("Issues", preparation.issues.len());
        output.count(
            "Summarized descriptions",
            preparation.issues.iter().filter(|i| i.summarized).count(),
        );
        if !preparation.failures.is_empty() {
            output.error(&format!(
                "\nNot prepared ({}):",
                preparation.failures.len()
            ));
            for failure in &preparation.failures {
                output.item(&format!("#{}: {}", failure.issue_id, failure.error));
            }
        }

        output.highlight(&format!("Creating issues in {}...", jira.project_key));
        let target = JiraTarget::new(&client, &jira.project_key, &lookups.field_id(&jira.id_field)?);
        let report = importer.publish(&target, &target, &preparation.issues)?;
        print_report(&output, &report);

        let failed = failed_issue_ids(&preparation, Some(&report));
        if !failed.is_empty() {
            write_error_log(&self.errorlog, &failed)?;
            output.warning(&format!(
                "Failed issue ids appended to {}",
                self.errorlog.display()
            ));
        }

        if report.is_clean() && failed.is_empty() {
            Ok(())
        } else {
            Err(CliError::Incomplete(format!(
                "{}; {} issues not prepared",
                incomplete(&report, "issues"),
                preparation.failures.len()
            )))
        }
    }
}
