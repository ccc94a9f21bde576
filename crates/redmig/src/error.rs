//! CLI error types.

use redmig_config::ConfigError;
use redmig_confluence::ConfluenceError;
use redmig_jira::JiraError;
use redmig_sequencer::PublishError;
use redmig_source::SourceError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Confluence(#[from] ConfluenceError),

    #[error("{0}")]
    Jira(#[from] JiraError),

    #[error("{0}")]
    Publish(#[from] PublishError),

    /// The run finished but some documents were not migrated.
    #[error("{0}")]
    Incomplete(String),
}
