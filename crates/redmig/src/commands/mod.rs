//! CLI command implementations.

pub(crate) mod export_wiki;
pub(crate) mod import_confluence;
pub(crate) mod import_jira;

use std::time::Duration;

use redmig_config::Config;
use redmig_sequencer::{PublishReport, TransitionOutcome, UnplacedReason};

use crate::output::Output;

pub(crate) use export_wiki::ExportWikiArgs;
pub(crate) use import_confluence::ImportConfluenceArgs;
pub(crate) use import_jira::ImportJiraArgs;

/// Per-request HTTP timeout from `[publish]`.
fn timeout(config: &Config) -> Option<Duration> {
    Some(Duration::from_secs(config.publish.timeout_secs))
}

/// `true` when set on the command line, otherwise left to the config file.
fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

/// Print the outcome of a publication run.
fn print_report(output: &Output, report: &PublishReport) {
    output.separator();
    output.success(&format!("Created: {}", report.created.len()));
    output.count("Already present", report.existing.len());
    output.count(
        "Created with shortened content",
        report.created.iter().filter(|p| p.used_fallback).count(),
    );
    output.count("Attachments uploaded", report.uploads.uploaded);
    output.count("Empty files skipped", report.uploads.skipped_empty);
    output.count("Attachments already present", report.uploads.already_present);

    if !report.unplaced.is_empty() {
        output.warning(&format!("\nNot placed ({}):", report.unplaced.len()));
        for unplaced in &report.unplaced {
            let reason = match unplaced.reason {
                UnplacedReason::MissingParent => "parent not found",
                UnplacedReason::Cycle => "parent chain loops",
                UnplacedReason::ParentFailed => "parent failed",
            };
            let parent = unplaced.parent.as_deref().unwrap_or("-");
            output.item(&format!("{} (parent {parent}): {reason}", unplaced.key));
        }
    }

    if !report.failures.is_empty() {
        output.error(&format!("\nFailed ({}):", report.failures.len()));
        for failure in &report.failures {
            output.item(&format!(
                "{} \"{}\": {} failed: {}",
                failure.key, failure.title, failure.operation, failure.error
            ));
        }
    }

    if !report.uploads.failures.is_empty() {
        output.warning(&format!(
            "\nAttachments not uploaded ({}):",
            report.uploads.failures.len()
        ));
        for failure in &report.uploads.failures {
            output.item(&format!("{} {}: {}", failure.key, failure.filename, failure.error));
        }
    }

    for workflow in report.workflows.iter().filter(|w| !w.log.is_complete()) {
        output.warning(&format!(
            "\nWorkflow of {} ({}) incomplete:",
            workflow.key, workflow.remote_id
        ));
        for entry in &workflow.log.entries {
            let outcome = match &entry.outcome {
                TransitionOutcome::Applied { .. } => "applied".to_owned(),
                TransitionOutcome::Unavailable { available } => {
                    format!("unavailable (offered: {})", available.join(", "))
                }
                TransitionOutcome::Failed { error } => format!("failed: {error}"),
            };
            output.item(&format!("{}: {outcome}", entry.status));
        }
    }

    if report.halted {
        output.warning(&format!(
            "\nStopped after the first failure; {} not attempted.",
            report.not_attempted.len()
        ));
    }
}

/// Summary line for an unclean run.
fn incomplete(report: &PublishReport, noun: &str) -> String {
    format!(
        "{} {noun} failed, {} not placed",
        report.failures.len(),
        report.unplaced.len()
    )
}
