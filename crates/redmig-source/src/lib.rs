//! Source side of redmig.
//!
//! - [`RedmineClient`] lists and fetches wiki pages and downloads files,
//!   authenticated with an API key or a session cookie;
//! - [`WikiExporter`] writes pages, attachments and embedded images into an
//!   [`ExportStore`];
//! - [`ExportStore`] reads the export layout back as [`SourceDocument`]s and
//!   [`IssueBundle`]s for the importers.

mod client;
mod document;
mod error;
mod export;
mod exporter;
mod issue;

pub use client::{RedmineAuth, RedmineClient, WikiSource, scrape_index};
pub use document::{FetchedPage, NamedRef, ParentRef, RedmineAttachment, SourceDocument, WikiPage};
pub use error::SourceError;
pub use export::{
    ExportStore, ExportedPage, PagePaths, parse_page_text, render_page_text, safe_filename,
};
pub use exporter::{ExportFailure, ExportReport, WikiExporter};
pub use issue::{CustomFields, IssueBundle, IssueRecord, IssueRelation};
pub use redmig_markup::{AssetLocator, AttachmentRef};
