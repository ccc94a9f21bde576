//! Publication error type.
//!
//! Every remote call made on behalf of the sequencer reports failures as a
//! [`PublishError`]. The [`PublishErrorKind`] decides what the sequencer does
//! next: retry, treat as success, fall back, record, or abort the run.

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// Network failure, timeout, rate limit or server error. Retried.
    Transient,
    /// The document or attachment already exists.
    Conflict,
    /// Referenced remote object does not exist.
    NotFound,
    /// Target rejected the body as too large.
    ContentTooLarge,
    /// Any other semantic rejection (validation errors).
    Rejected,
    /// Credentials or target container problem; aborts the run.
    Fatal,
}

impl PublishErrorKind {
    fn label(self) -> &'static str {
        match self {
            Self::Transient => "Transient",
            Self::Conflict => "Conflict",
            Self::NotFound => "Not found",
            Self::ContentTooLarge => "Content too large",
            Self::Rejected => "Rejected",
            Self::Fatal => "Fatal",
        }
    }
}

/// Error from a remote publication call.
#[derive(Debug)]
pub struct PublishError {
    /// Semantic error category.
    pub kind: PublishErrorKind,
    /// HTTP status, when the error came from a response.
    pub status: Option<u16>,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PublishError {
    #[must_use]
    pub fn new(kind: PublishErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(PublishErrorKind::Transient, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(PublishErrorKind::Conflict, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PublishErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(PublishErrorKind::Rejected, message)
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(PublishErrorKind::Fatal, message)
    }

    /// Classify an HTTP error response.
    ///
    /// | Response | Kind |
    /// |---|---|
    /// | 429, 5xx | `Transient` |
    /// | 413, body mentions `CONTENT_LIMIT_EXCEEDED` | `ContentTooLarge` |
    /// | 400/409 saying "already exists" or "same file name" | `Conflict` |
    /// | 404 | `NotFound` |
    /// | 401, 403 | `Fatal` |
    /// | other | `Rejected` |
    #[must_use]
    pub fn from_http(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        let kind = match status {
            429 | 500..=599 => PublishErrorKind::Transient,
            413 => PublishErrorKind::ContentTooLarge,
            _ if body.contains("CONTENT_LIMIT_EXCEEDED") => PublishErrorKind::ContentTooLarge,
            400 | 409
                if lower.contains("already exists")
                    || lower.contains("same file name")
                    || lower.contains("same title") =>
            {
                PublishErrorKind::Conflict
            }
            409 => PublishErrorKind::Conflict,
            404 => PublishErrorKind::NotFound,
            401 | 403 => PublishErrorKind::Fatal,
            _ => PublishErrorKind::Rejected,
        };
        Self::new(kind, body.trim()).with_status(status)
    }

    /// Transport-level failure (DNS, TLS, timeout, reset).
    #[must_use]
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(PublishErrorKind::Transient, "request failed").with_source(source)
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == PublishErrorKind::Transient
    }

    /// Whether the whole run must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind == PublishErrorKind::Fatal
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "Kind: message: source (HTTP 409)"
        write!(f, "{}: {}", self.kind.label(), self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        Self::new(PublishErrorKind::NotFound, "cannot read local asset").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        assert!(PublishError::from_http(503, "unavailable").is_transient());
        assert!(PublishError::from_http(429, "slow down").is_transient());
        assert!(!PublishError::from_http(400, "bad").is_transient());
    }

    #[test]
    fn test_classify_conflict() {
        let page = PublishError::from_http(
            400,
            r#"{"errors":[{"title":"A page with this title already exists"}]}"#,
        );
        assert_eq!(page.kind, PublishErrorKind::Conflict);

        let attachment = PublishError::from_http(
            400,
            "Cannot add a new attachment with same file name as an existing attachment",
        );
        assert_eq!(attachment.kind, PublishErrorKind::Conflict);
    }

    #[test]
    fn test_classify_content_too_large() {
        let jira = PublishError::from_http(
            400,
            r#"{"errors":{"description":"CONTENT_LIMIT_EXCEEDED"}}"#,
        );
        assert_eq!(jira.kind, PublishErrorKind::ContentTooLarge);
        assert_eq!(
            PublishError::from_http(413, "").kind,
            PublishErrorKind::ContentTooLarge
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(PublishError::from_http(404, "").kind, PublishErrorKind::NotFound);
        assert!(PublishError::from_http(401, "").is_fatal());
        assert!(PublishError::from_http(403, "").is_fatal());
        assert_eq!(
            PublishError::from_http(400, "field required").kind,
            PublishErrorKind::Rejected
        );
    }

    #[test]
    fn test_display() {
        let err = PublishError::from_http(409, " duplicate \n");
        assert_eq!(err.to_string(), "Conflict: duplicate (HTTP 409)");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PublishError::transport(io);
        assert_eq!(err.to_string(), "Transient: request failed: gone");
    }
}
