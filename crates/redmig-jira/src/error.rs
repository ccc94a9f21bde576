//! Error types for Jira integration.

use redmig_sequencer::PublishError;
use redmig_source::SourceError;

/// Error from Jira API operations and issue preparation.
#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed")]
    HttpRequest(#[from] ureq::Error),

    /// HTTP response error (server returned error status).
    #[error("HTTP error: {status} - {body}")]
    HttpResponse {
        /// HTTP status code.
        status: u16,
        /// Response body (may contain error details).
        body: String,
    },

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// A configured field name is unknown to the site.
    #[error("Field '{0}' not found in Jira")]
    FieldNotFound(String),

    /// A required field mapping has neither a value nor a default.
    #[error("Issue #{issue}: no value for required field '{field}'")]
    MissingField {
        /// Redmine issue id.
        issue: u64,
        /// Jira field name.
        field: String,
    },

    /// Reading the export directory failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A remote lookup made while preparing an issue failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl From<JiraError> for PublishError {
    fn from(err: JiraError) -> Self {
        match err {
            JiraError::HttpRequest(e) => PublishError::transport(e),
            JiraError::HttpResponse { status, body } => PublishError::from_http(status, &body),
            JiraError::Io(e) => PublishError::from(e),
            JiraError::Json(e) => {
                PublishError::rejected("malformed Jira response").with_source(e)
            }
            err @ JiraError::FieldNotFound(_) => PublishError::fatal(err.to_string()),
            err @ JiraError::MissingField { .. } => PublishError::rejected(err.to_string()),
            JiraError::Source(e) => e.into(),
            JiraError::Publish(e) => e,
        }
    }
}
