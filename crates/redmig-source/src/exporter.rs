//! Wiki export: Redmine pages to the on-disk export layout.

use std::collections::HashSet;
use std::path::Path;

use redmig_markup::{AssetKind, AssetLocator, AssetResolver, normalize};
use tracing::{info, warn};

use crate::client::WikiSource;
use crate::error::SourceError;
use crate::export::ExportStore;

/// Page or file that could not be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    pub page: String,
    /// Attachment filename or image reference, when the failure is about one.
    pub item: Option<String>,
    pub error: String,
}

/// Outcome of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Titles in the order they were written.
    pub exported: Vec<String>,
    pub skipped: Vec<String>,
    /// Attachments written to `_attachments`.
    pub attachments: usize,
    /// Embedded images written to `_images`.
    pub images: usize,
    pub failures: Vec<ExportFailure>,
    /// Stopped at the first failure.
    pub halted: bool,
}

/// Exports every wiki page of a project.
pub struct WikiExporter<'a> {
    source: &'a dyn WikiSource,
    store: &'a ExportStore,
    skip: HashSet<String>,
    base_url: Option<String>,
    fail_fast: bool,
}

impl<'a> WikiExporter<'a> {
    pub fn new(source: &'a dyn WikiSource, store: &'a ExportStore) -> Self {
        Self {
            source,
            store,
            skip: HashSet::new(),
            base_url: None,
            fail_fast: false,
        }
    }

    /// Titles that are not exported.
    #[must_use]
    pub fn skip_pages(mut self, titles: impl IntoIterator<Item = String>) -> Self {
        self.skip.extend(titles);
        self
    }

    /// Base URL root-relative image references are joined against.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Export all pages.
    ///
    /// Only a failure to list pages or to create the export directory is
    /// returned as an error; per-page problems are collected in the report.
    pub fn run(&self) -> Result<ExportReport, SourceError> {
        self.store.ensure_dir()?;
        let titles = self.source.list_pages()?;
        info!("Found {} wiki pages", titles.len());

        let mut report = ExportReport::default();
        for title in titles {
            if self.skip.contains(&title) {
                info!("Skipping page '{}'", title);
                report.skipped.push(title);
                continue;
            }
            let before = report.failures.len();
            if let Err(e) = self.export_page(&title, &mut report) {
                warn!("Failed to export page '{}': {}", title, e);
                report.failures.push(ExportFailure {
                    page: title.clone(),
                    item: None,
                    error: e.to_string(),
                });
            } else {
                report.exported.push(title);
            }
            if self.fail_fast && report.failures.len() > before {
                report.halted = true;
                break;
            }
        }
        Ok(report)
    }

    fn export_page(&self, title: &str, report: &mut ExportReport) -> Result<(), SourceError> {
        let fetched = self.source.fetch_page(title)?;
        let mut doc = fetched.page.to_document();
        // The listed title is the one other pages refer to.
        doc.title = title.to_owned();
        doc.id = title.to_owned();
        let paths = self.store.write_page(&doc, &fetched.raw)?;

        for attachment in &doc.attachments {
            if let AssetLocator::Url(url) = &attachment.locator
                && self.download(url, &paths.attachments_dir, &attachment.filename, title, report)
            {
                report.attachments += 1;
            }
        }

        let mut tree = normalize(&doc.body);
        let mut resolver = AssetResolver::new(&doc.attachments);
        if let Some(base) = &self.base_url {
            resolver = resolver.with_base_url(base.clone());
        }
        let resolution = resolver.resolve(&mut tree);
        for failure in resolution.failures {
            warn!(page = %title, reference = %failure.reference, "Unresolved image: {}", failure.reason);
        }
        for asset in resolution
            .assets
            .iter()
            .filter(|a| a.kind == AssetKind::Remote)
        {
            if let AssetLocator::Url(url) = &asset.source
                && self.download(url, &paths.images_dir, &asset.target_filename, title, report)
            {
                report.images += 1;
            }
        }
        Ok(())
    }

    /// Download one file; failures are recorded in the report.
    fn download(
        &self,
        url: &str,
        dir: &Path,
        filename: &str,
        page: &str,
        report: &mut ExportReport,
    ) -> bool {
        let result = self
            .source
            .fetch_bytes(url)
            .and_then(|data| self.store.write_asset(dir, filename, &data));
        match result {
            Ok(path) => {
                info!("Downloaded {}", path.display());
                true
            }
            Err(e) => {
                warn!("Failed to download {} for '{}': {}", url, page, e);
                report.failures.push(ExportFailure {
                    page: page.to_owned(),
                    item: Some(filename.to_owned()),
                    error: e.to_string(),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::document::FetchedPage;

    #[derive(Default)]
    struct MemorySource {
        pages: Vec<(String, String)>,
        files: HashMap<String, Vec<u8>>,
    }

    impl MemorySource {
        fn page(mut self, title: &str, json: &str) -> Self {
            self.pages.push((title.to_owned(), json.to_owned()));
            self
        }

        fn file(mut self, url: &str, data: &[u8]) -> Self {
            self.files.insert(url.to_owned(), data.to_vec());
            self
        }
    }

    impl WikiSource for MemorySource {
        fn list_pages(&self) -> Result<Vec<String>, SourceError> {
            Ok(self.pages.iter().map(|(t, _)| t.clone()).collect())
        }

        fn fetch_page(&self, title: &str) -> Result<FetchedPage, SourceError> {
            let (_, json) = self
                .pages
                .iter()
                .find(|(t, _)| t == title)
                .ok_or_else(|| SourceError::HttpResponse {
                    status: 404,
                    body: String::new(),
                })?;
            Ok(FetchedPage::parse(json.clone())?)
        }

        fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| SourceError::HttpResponse {
                    status: 404,
                    body: url.to_owned(),
                })
        }
    }

    const HOME: &str = r#"{"wiki_page": {
        "title": "Wiki",
        "text": "!Logo.PNG!\n\n!https://cdn.example.com/img/banner.gif?v=2!\n\n!/images/local.png!",
        "attachments": [
            {"filename": "logo.png", "content_url": "https://r.example.com/attachments/download/1/logo.png"}
        ]
    }}"#;

    #[test]
    fn test_export_pages_with_assets() {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        let source = MemorySource::default()
            .page("Wiki", HOME)
            .page("Draft", r#"{"wiki_page": {"title": "Draft"}}"#)
            .file("https://r.example.com/attachments/download/1/logo.png", b"png")
            .file("https://cdn.example.com/img/banner.gif?v=2", b"gif")
            .file("https://r.example.com/images/local.png", b"local");

        let report = WikiExporter::new(&source, &store)
            .skip_pages(["Draft".to_owned()])
            .base_url("https://r.example.com")
            .run()
            .unwrap();

        assert_eq!(report.exported, vec!["Wiki"]);
        assert_eq!(report.skipped, vec!["Draft"]);
        assert_eq!(report.attachments, 1);
        assert_eq!(report.images, 2);
        assert!(report.failures.is_empty());

        let dir = temp.path();
        assert!(dir.join("Wiki.json").is_file());
        assert!(dir.join("Wiki.txt").is_file());
        assert!(!dir.join("Draft.txt").exists());
        assert_eq!(fs::read(dir.join("Wiki_attachments/logo.png")).unwrap(), b"png");
        assert_eq!(fs::read(dir.join("Wiki_images/banner.gif")).unwrap(), b"gif");
        assert_eq!(fs::read(dir.join("Wiki_images/local.png")).unwrap(), b"local");
        assert!(!dir.join("Wiki_images/logo.png").exists());
    }

    #[test]
    fn test_download_failure_is_soft() {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        let source = MemorySource::default().page("Wiki", HOME);

        let report = WikiExporter::new(&source, &store).run().unwrap();

        assert_eq!(report.exported, vec!["Wiki"]);
        // logo.png and banner.gif fail; the root-relative image has no base URL.
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].item.as_deref(), Some("logo.png"));
        assert!(!report.halted);
    }

    #[test]
    fn test_fail_fast_stops_after_first_failed_page() {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        let source = MemorySource::default()
            .page("Broken", "not json")
            .page("Wiki", r#"{"wiki_page": {"title": "Wiki"}}"#);

        let report = WikiExporter::new(&source, &store)
            .fail_fast(true)
            .run()
            .unwrap();

        assert!(report.halted);
        assert!(report.exported.is_empty());
        assert_eq!(report.failures[0].page, "Broken");
    }
}
