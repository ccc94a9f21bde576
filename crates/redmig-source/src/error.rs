//! Error types for Redmine access and the export layout.

use redmig_sequencer::PublishError;

/// Error from the source side of a migration.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed")]
    HttpRequest(#[from] ureq::Error),

    /// HTTP response error.
    #[error("HTTP error: {status} - {body}")]
    HttpResponse {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export directory content that cannot be read back.
    #[error("Invalid export file {path}: {message}")]
    InvalidExport {
        /// File that failed to parse.
        path: String,
        /// What is wrong with it.
        message: String,
    },
}

impl From<SourceError> for PublishError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::HttpRequest(e) => PublishError::transport(e),
            SourceError::HttpResponse { status, body } => PublishError::from_http(status, &body),
            SourceError::Io(e) => PublishError::from(e),
            SourceError::Json(e) => PublishError::rejected("malformed response").with_source(e),
            SourceError::InvalidExport { path, message } => {
                PublishError::rejected(format!("{path}: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use redmig_sequencer::PublishErrorKind;

    use super::*;

    #[test]
    fn test_http_response_is_classified() {
        let err: PublishError = SourceError::HttpResponse {
            status: 503,
            body: "maintenance".to_owned(),
        }
        .into();
        assert!(err.is_transient());

        let err: PublishError = SourceError::HttpResponse {
            status: 404,
            body: String::new(),
        }
        .into();
        assert_eq!(err.kind, PublishErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_export_display() {
        let err = SourceError::InvalidExport {
            path: "Home.txt".to_owned(),
            message: "missing Title header".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid export file Home.txt: missing Title header"
        );
    }
}
