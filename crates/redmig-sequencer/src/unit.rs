//! Publish units.

use std::path::Path;

use redmig_markup::{AssetLocator, ResolvedAsset};

use crate::workflow::WorkflowTransitionPlan;

/// File uploaded to a published document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    /// Filename on the target.
    pub filename: String,
    pub source: AssetLocator,
    pub content_type: Option<String>,
}

impl AssetFile {
    /// Local file uploaded under its own name.
    pub fn local(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source: AssetLocator::Path(path.to_path_buf()),
            content_type: None,
        }
    }

    /// Content type, guessed from the extension when not known.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or_else(|| guess_content_type(&self.filename))
    }
}

impl From<ResolvedAsset> for AssetFile {
    fn from(asset: ResolvedAsset) -> Self {
        Self {
            filename: asset.target_filename,
            source: asset.source,
            content_type: None,
        }
    }
}

/// Alternative body used when the target rejects the primary one as too large.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback<B> {
    pub body: B,
    /// Extra files uploaded with the fallback, typically the full original text.
    pub attachments: Vec<AssetFile>,
}

/// One document queued for creation on one target.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishUnit<B> {
    /// Source identifier, unique within a run.
    pub key: String,
    /// Title on the target.
    pub title: String,
    /// Key of the parent unit, if any.
    pub parent: Option<String>,
    pub body: B,
    pub fallback: Option<Fallback<B>>,
    pub attachments: Vec<AssetFile>,
    pub workflow: Option<WorkflowTransitionPlan>,
}

impl<B> PublishUnit<B> {
    pub fn new(key: impl Into<String>, title: impl Into<String>, body: B) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            parent: None,
            body,
            fallback: None,
            attachments: Vec::new(),
            workflow: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<AssetFile>) -> Self {
        self.attachments = attachments;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Fallback<B>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn with_workflow(mut self, workflow: WorkflowTransitionPlan) -> Self {
        self.workflow = Some(workflow);
        self
    }
}

fn guess_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_asset_file() {
        let file = AssetFile::local("/tmp/export/Home_attachments/Report.PDF");
        assert_eq!(file.filename, "Report.PDF");
        assert_eq!(file.content_type(), "application/pdf");
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let file = AssetFile {
            filename: "blob".to_owned(),
            source: AssetLocator::Url("https://x/blob".to_owned()),
            content_type: Some("image/png".to_owned()),
        };
        assert_eq!(file.content_type(), "image/png");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
