//! Wiki import: exported pages to Confluence pages.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use rayon::prelude::*;
use redmig_config::{Config, ConfigError};
use redmig_markup::{
    AssetResolver, IssueLinkMode, ReferenceRewriter, ResolutionFailure, RewriteSummary,
    TitleTransform, normalize,
};
use redmig_sequencer::{
    AssetFetcher, AssetFile, ExistingPolicy, Fallback, PublishError, PublishReport,
    PublishTarget, PublishUnit, RetryPolicy, Sequencer, SequencerOptions,
};
use redmig_source::{ExportStore, ExportedPage};
use tracing::{info, warn};

use crate::error::ConfluenceError;
use crate::storage::{fallback_body, to_storage};

/// One exported page turned into a publish unit.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub unit: PublishUnit<String>,
    /// Where the dry run writes the assembled body.
    pub html_path: PathBuf,
    /// Images that stay as placeholders.
    pub unresolved: Vec<ResolutionFailure>,
    pub links: RewriteSummary,
}

/// Builds Confluence pages from an export directory and publishes them.
pub struct WikiImporter<'a> {
    store: &'a ExportStore,
    titles: TitleTransform,
    origin: Option<String>,
    issue_search_url: Option<String>,
    page_root: Option<String>,
    pages: Option<HashSet<String>>,
    fail_fast: bool,
    overwrite: bool,
    retry: RetryPolicy,
    fetcher: Option<&'a dyn AssetFetcher>,
}

impl<'a> WikiImporter<'a> {
    pub fn new(store: &'a ExportStore) -> Self {
        Self {
            store,
            titles: TitleTransform::default(),
            origin: None,
            issue_search_url: None,
            page_root: None,
            pages: None,
            fail_fast: false,
            overwrite: false,
            retry: RetryPolicy::default(),
            fetcher: None,
        }
    }

    /// Importer set up from the `[confluence]`, `[links]` and `[publish]`
    /// sections.
    pub fn from_config(store: &'a ExportStore, config: &Config) -> Result<Self, ConfigError> {
        let confluence = config.require_confluence()?;
        let mut importer = Self::new(store)
            .title_suffix(&confluence.title_suffix)
            .page_root(&confluence.page_root)
            .fail_fast(config.publish.fail_fast)
            .overwrite(config.publish.overwrite)
            .retry(RetryPolicy::new(
                config.publish.retry_attempts,
                Duration::from_millis(config.publish.retry_backoff_ms),
            ));
        if let Some(origin) = config.origin_url() {
            importer = importer.origin_url(origin);
        }
        if let Some(template) = config.issue_search_url() {
            importer = importer.issue_search_url(template);
        }
        Ok(importer)
    }

    /// Qualifier appended to every page title.
    #[must_use]
    pub fn title_suffix(mut self, suffix: &str) -> Self {
        self.titles = TitleTransform::suffix(suffix).underscore_spaces();
        self
    }

    /// Redmine base URL; links into it are rewritten.
    #[must_use]
    pub fn origin_url(mut self, url: impl Into<String>) -> Self {
        self.origin = Some(url.into());
        self
    }

    /// Search URL template issue links point at (`{id}` placeholder).
    #[must_use]
    pub fn issue_search_url(mut self, template: impl Into<String>) -> Self {
        self.issue_search_url = Some(template.into());
        self
    }

    /// Title of the page that parentless pages hang under.
    #[must_use]
    pub fn page_root(mut self, title: impl Into<String>) -> Self {
        self.page_root = Some(title.into());
        self
    }

    /// Import only these pages. Spaces and underscores are interchangeable.
    #[must_use]
    pub fn pages(mut self, titles: impl IntoIterator<Item = String>) -> Self {
        self.pages = Some(titles.into_iter().map(|t| t.replace(' ', "_")).collect());
        self
    }

    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Delete and recreate pages that already exist.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Source of remote image bytes not present in the export.
    #[must_use]
    pub fn fetcher(mut self, fetcher: &'a dyn AssetFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Title mapping shared with the target.
    #[must_use]
    pub fn titles(&self) -> &TitleTransform {
        &self.titles
    }

    /// Read the export directory and assemble every selected page.
    ///
    /// Pages are assembled in parallel; the result keeps file name order.
    pub fn prepare(&self) -> Result<Vec<PreparedPage>, ConfluenceError> {
        let pages: Vec<ExportedPage> = self
            .store
            .read_pages()?
            .into_iter()
            .filter(|p| self.selected(&p.document.title))
            .collect();
        info!("Preparing {} pages", pages.len());

        Ok(pages.par_iter().map(|p| self.prepare_page(p)).collect())
    }

    fn selected(&self, title: &str) -> bool {
        self.pages
            .as_ref()
            .is_none_or(|pages| pages.contains(&title.replace(' ', "_")))
    }

    fn prepare_page(&self, page: &ExportedPage) -> PreparedPage {
        let doc = &page.document;
        let mut tree = normalize(&doc.body);

        let mut resolver = AssetResolver::new(&doc.attachments);
        if let Some(origin) = &self.origin {
            resolver = resolver.with_base_url(origin.clone());
        }
        let resolution = resolver.resolve(&mut tree);
        for failure in &resolution.failures {
            warn!(page = %doc.title, reference = %failure.reference, "Unresolved image: {}", failure.reason);
        }

        let mut rewriter =
            ReferenceRewriter::new(self.origin.as_deref()).title_transform(self.titles.clone());
        if let Some(template) = &self.issue_search_url {
            rewriter = rewriter.issue_links(IssueLinkMode::Search {
                url_template: template.clone(),
            });
        }
        let links = rewriter.rewrite(&mut tree);

        // Every exported file is uploaded, referenced or not.
        let mut attachments: Vec<AssetFile> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for file in &doc.attachments {
            if seen.insert(file.filename.clone()) {
                attachments.push(AssetFile {
                    filename: file.filename.clone(),
                    source: file.locator.clone(),
                    content_type: file.content_type.clone(),
                });
            }
        }
        for asset in resolution.assets {
            if seen.insert(asset.target_filename.clone()) {
                attachments.push(asset.into());
            }
        }

        let text_name = page
            .paths
            .text
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = self.titles.title_for(&doc.title);
        let mut unit = PublishUnit::new(doc.title.clone(), title.clone(), to_storage(&tree))
            .with_attachments(attachments)
            .with_fallback(Fallback {
                body: fallback_body(&title, &text_name),
                attachments: vec![AssetFile::local(&page.paths.text)],
            });
        if let Some(parent) = doc.parent.as_ref().filter(|p| !p.is_empty()) {
            unit = unit.with_parent(parent.clone());
        }

        PreparedPage {
            unit,
            html_path: page.paths.html.clone(),
            unresolved: resolution.failures,
            links,
        }
    }

    /// Write each assembled body as `{page}.html` without contacting Confluence.
    pub fn dry_run(&self, pages: &[PreparedPage]) -> Result<Vec<PathBuf>, ConfluenceError> {
        pages
            .iter()
            .map(|p| {
                let path = self.store.write_html(&p.unit.key, &p.unit.body)?;
                info!("Wrote {}", path.display());
                Ok(path)
            })
            .collect()
    }

    /// Publish prepared pages.
    ///
    /// `root_parent_id` is the Confluence page or folder the root page is
    /// created under.
    pub fn publish<T: PublishTarget<Body = String>>(
        &self,
        target: &T,
        pages: &[PreparedPage],
        root_parent_id: Option<String>,
    ) -> Result<PublishReport, PublishError> {
        let units: Vec<PublishUnit<String>> = pages.iter().map(|p| p.unit.clone()).collect();
        let options = SequencerOptions {
            fail_fast: self.fail_fast,
            existing: if self.overwrite {
                ExistingPolicy::Recreate
            } else {
                ExistingPolicy::Skip
            },
            upload_to_existing: false,
            root_key: self.page_root.clone(),
            root_parent_id,
        };

        let mut sequencer = Sequencer::new(target).options(options).retry(self.retry);
        if let Some(fetcher) = self.fetcher {
            sequencer = sequencer.fetcher(fetcher);
        }
        sequencer.publish(&units)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use redmig_sequencer::{MockTarget, UnplacedReason};
    use redmig_source::SourceDocument;
    use tempfile::TempDir;

    use super::*;

    fn write_page(store: &ExportStore, title: &str, parent: Option<&str>, body: &str) {
        let doc = SourceDocument {
            id: title.to_owned(),
            title: title.to_owned(),
            body: body.to_owned(),
            parent: parent.map(str::to_owned),
            ..SourceDocument::default()
        };
        store.write_page(&doc, "{}").unwrap();
    }

    fn export() -> (TempDir, ExportStore) {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        write_page(&store, "Wiki", None, "h1. Start\n\nSee [[Install Guide]].");
        write_page(
            &store,
            "Install_Guide",
            Some("Wiki"),
            "!setup.png!\n\nbc(bash). make install\n\nRelated: \"Bug 42\":https://redmine.example.com/issues/42",
        );
        write_page(&store, "Orphan", None, "Lost page");
        let paths = store.page_paths("Install_Guide");
        store
            .write_asset(&paths.attachments_dir, "setup.png", b"png")
            .unwrap();
        store
            .write_asset(&paths.attachments_dir, "notes.pdf", b"pdf")
            .unwrap();
        (temp, store)
    }

    fn importer(store: &ExportStore) -> WikiImporter<'_> {
        WikiImporter::new(store)
            .title_suffix(" (Legacy)")
            .page_root("Wiki")
            .origin_url("https://redmine.example.com")
            .issue_search_url("https://jira.example.com/issues/?jql=\"RedmineID:{id}\"")
            .retry(RetryPolicy::none())
    }

    #[test]
    fn test_prepare_assembles_pages() {
        let (_temp, store) = export();
        let pages = importer(&store).prepare().unwrap();

        let keys: Vec<&str> = pages.iter().map(|p| p.unit.key.as_str()).collect();
        assert_eq!(keys, vec!["Install_Guide", "Orphan", "Wiki"]);

        let guide = &pages[0];
        assert_eq!(guide.unit.title, "Install_Guide (Legacy)");
        assert_eq!(guide.unit.parent.as_deref(), Some("Wiki"));
        assert!(guide.unresolved.is_empty());
        assert!(guide.unit.body.contains(r#"<ri:attachment ri:filename="setup.png"/>"#));
        assert!(guide.unit.body.contains(r#"<ac:parameter ac:name="language">sh</ac:parameter>"#));
        assert!(guide.unit.body.contains("jql=&quot;RedmineID:42&quot;"));
        let files: Vec<&str> = guide
            .unit
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(files, vec!["notes.pdf", "setup.png"]);

        let fallback = guide.unit.fallback.as_ref().unwrap();
        assert_eq!(fallback.attachments[0].filename, "Install_Guide.txt");

        let wiki = &pages[2];
        assert_eq!(wiki.links.page_links, vec!["Install_Guide (Legacy)".to_owned()]);
        assert!(wiki.unit.body.contains(r#"ri:content-title="Install_Guide (Legacy)""#));
    }

    #[test]
    fn test_page_filter() {
        let (_temp, store) = export();
        let pages = importer(&store)
            .pages(["Install Guide".to_owned()])
            .prepare()
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].unit.key, "Install_Guide");
    }

    #[test]
    fn test_dry_run_writes_html() {
        let (temp, store) = export();
        let importer = importer(&store);
        let pages = importer.prepare().unwrap();
        let written = importer.dry_run(&pages).unwrap();

        assert_eq!(written.len(), 3);
        let html = fs::read_to_string(temp.path().join("Wiki.html")).unwrap();
        assert!(html.starts_with("<h1>Start</h1>"));
    }

    #[test]
    fn test_publish_places_orphans_under_root() {
        let (_temp, store) = export();
        let importer = importer(&store);
        let pages = importer.prepare().unwrap();
        let target = MockTarget::new();

        let report = importer
            .publish(&target, &pages, Some("folder-1".to_owned()))
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.created.len(), 3);
        let wiki = target.document("Wiki (Legacy)").unwrap();
        assert_eq!(wiki.parent_id.as_deref(), Some("folder-1"));
        let orphan = target.document("Orphan (Legacy)").unwrap();
        assert_eq!(orphan.parent_id, Some(wiki.id.clone()));
        let guide = target.document("Install_Guide (Legacy)").unwrap();
        assert_eq!(guide.parent_id, Some(wiki.id));
        assert_eq!(target.attachments(&guide.id), vec!["notes.pdf", "setup.png"]);
    }

    #[test]
    fn test_rerun_skips_existing_pages() {
        let (_temp, store) = export();
        let importer = importer(&store);
        let pages = importer.prepare().unwrap();
        let target = MockTarget::new().with_existing("Wiki (Legacy)");

        let report = importer.publish(&target, &pages, None).unwrap();

        assert_eq!(report.existing.len(), 1);
        assert_eq!(report.created.len(), 2);
        assert_eq!(target.documents().len(), 3);
    }

    #[test]
    fn test_missing_parent_is_unplaced() {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        write_page(&store, "Child", Some("Gone"), "x");
        let importer = importer(&store);
        let pages = importer.prepare().unwrap();
        let target = MockTarget::new();

        let report = importer.publish(&target, &pages, None).unwrap();

        assert!(report.created.is_empty());
        assert_eq!(report.unplaced.len(), 1);
        assert_eq!(report.unplaced[0].reason, UnplacedReason::MissingParent);
    }

    #[test]
    fn test_from_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("redmig.toml");
        fs::write(
            &config_path,
            r#"
[redmine]
base_url = "https://redmine.example.com"
project = "ops"
api_key = "k"

[confluence]
base_url = "https://acme.atlassian.net"
user = "dana@example.com"
api_token = "t"
space_key = "DOCS"
title_suffix = " [old]"
"#,
        )
        .unwrap();
        let config = Config::load(Some(&config_path), None).unwrap();
        let store = ExportStore::new(temp.path());

        let importer = WikiImporter::from_config(&store, &config).unwrap();

        assert_eq!(importer.titles().title_for("Wiki"), "Wiki [old]");
        assert_eq!(importer.page_root.as_deref(), Some("Wiki"));
        assert_eq!(importer.origin.as_deref(), Some("https://redmine.example.com"));
        assert_eq!(
            importer.issue_search_url.as_deref(),
            Some("https://acme.atlassian.net/issues/?jql=\"RedmineID:{id}\"")
        );
    }
}
