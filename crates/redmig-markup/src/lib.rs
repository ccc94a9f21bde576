//! Document transformation front half for redmig.
//!
//! Raw Redmine Textile goes through three steps, each working on the same
//! [`ContentTree`]:
//!
//! 1. [`normalize`] parses markup into the tree,
//! 2. [`AssetResolver`] binds image references to attachments or URLs,
//! 3. [`ReferenceRewriter`] retargets wiki, issue and bare links.
//!
//! The target assemblers live in the Confluence and Jira crates.
//!
//! # Example
//!
//! ```
//! use redmig_markup::{AssetResolver, ReferenceRewriter, TitleTransform, normalize};
//!
//! let mut tree = normalize("h2. Notes\n\nSee [[Install]] and !diagram.png!");
//! let resolution = AssetResolver::new(&[]).resolve(&mut tree);
//! assert_eq!(resolution.failures.len(), 1);
//!
//! let summary = ReferenceRewriter::new(Some("https://redmine.example.com"))
//!     .title_transform(TitleTransform::suffix(" (Legacy)"))
//!     .rewrite(&mut tree);
//! assert_eq!(summary.page_links, vec!["Install (Legacy)".to_owned()]);
//! ```

mod normalize;
mod resolve;
mod rewrite;
mod tree;

pub use normalize::normalize;
pub use resolve::{
    AssetKind, AssetLocator, AssetResolver, AttachmentRef, ResolutionFailure, Resolution,
    ResolvedAsset, url_filename,
};
pub use rewrite::{IssueLinkMode, ReferenceRewriter, RewriteSummary, TitleTransform};
pub use tree::{
    CodeBlock, ContentTree, Image, ImageState, Link, LinkTarget, Node, PanelKind, Style, Table,
    TableCell, TableRow,
};
