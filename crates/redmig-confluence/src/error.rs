//! Error types for Confluence integration.

use redmig_sequencer::PublishError;
use redmig_source::SourceError;

/// Error from Confluence API operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfluenceError {
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

    /// Space key unknown to the site.
    #[error("Space '{0}' not found")]
    SpaceNotFound(String),

    /// Parent folder not among the children of the space home page.
    #[error("Folder '{folder}' not found in space '{space}'")]
    FolderNotFound {
        /// Folder title.
        folder: String,
        /// Space key.
        space: String,
    },

    /// Reading the export directory failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl From<ConfluenceError> for PublishError {
    fn from(err: ConfluenceError) -> Self {
        match err {
            ConfluenceError::HttpRequest(e) => PublishError::transport(e),
            ConfluenceError::HttpResponse { status, body } => {
                PublishError::from_http(status, &body)
            }
            ConfluenceError::Io(e) => PublishError::from(e),
            ConfluenceError::Json(e) => {
                PublishError::rejected("malformed Confluence response").with_source(e)
            }
            err @ (ConfluenceError::SpaceNotFound(_) | ConfluenceError::FolderNotFound { .. }) => {
                PublishError::fatal(err.to_string())
            }
            ConfluenceError::Source(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use redmig_sequencer::PublishErrorKind;

    use super::*;

    #[test]
    fn test_title_conflict_maps_to_conflict() {
        let err: PublishError = ConfluenceError::HttpResponse {
            status: 400,
            body: r#"{"errors":[{"status":400,"title":"A page with this title already exists: A page already exists with the same TITLE in this space"}]}"#.to_owned(),
        }
        .into();
        assert_eq!(err.kind, PublishErrorKind::Conflict);
    }

    #[test]
    fn test_missing_space_is_fatal() {
        let err: PublishError = ConfluenceError::SpaceNotFound("DOCS".to_owned()).into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("DOCS"));
    }
}
