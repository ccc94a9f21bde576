//! Asset resolution.
//!
//! Matches every image reference in a [`ContentTree`] against the attachments
//! known for the document, or derives a remote location for it. Resolution
//! never fetches anything; bytes are pulled later by whoever publishes the
//! document, one asset at a time.

use std::collections::HashMap;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::tree::{ContentTree, Image, ImageState, Node};

/// Where the bytes of an asset live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetLocator {
    /// Remote URL, fetched on demand.
    Url(String),
    /// Local file, typically inside an export directory.
    Path(PathBuf),
}

/// Attachment known to belong to a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub filename: String,
    pub locator: AssetLocator,
    pub content_type: Option<String>,
}

impl AttachmentRef {
    /// Attachment stored as a local file; the filename is the last path component.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            filename,
            locator: AssetLocator::Path(path),
            content_type: None,
        }
    }
}

/// How an asset was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// One of the document's own attachments.
    Attachment,
    /// Derived from an absolute or root-relative URL.
    Remote,
}

/// Asset that an image reference resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// First reference, as written, that resolved to this asset.
    pub original_reference: String,
    pub source: AssetLocator,
    /// Filename the asset is uploaded under on the target.
    pub target_filename: String,
    pub kind: AssetKind,
}

/// Image reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub reference: String,
    pub reason: String,
}

/// Outcome of resolving one tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Distinct assets by source, in first-reference order. Target filenames
    /// are unique within a resolution.
    pub assets: Vec<ResolvedAsset>,
    pub failures: Vec<ResolutionFailure>,
}

/// Resolves image references against a document's attachments.
pub struct AssetResolver<'a> {
    exact: HashMap<&'a str, &'a AttachmentRef>,
    folded: HashMap<String, &'a AttachmentRef>,
    base_url: Option<String>,
}

impl<'a> AssetResolver<'a> {
    pub fn new(attachments: &'a [AttachmentRef]) -> Self {
        let mut exact = HashMap::new();
        let mut folded = HashMap::new();
        for attachment in attachments {
            exact.entry(attachment.filename.as_str()).or_insert(attachment);
            folded
                .entry(attachment.filename.to_lowercase())
                .or_insert(attachment);
        }
        Self {
            exact,
            folded,
            base_url: None,
        }
    }

    /// Base URL that root-relative references are joined against.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_owned());
        self
    }

    /// Annotate every image in `tree` and collect the assets it needs.
    pub fn resolve(&self, tree: &mut ContentTree) -> Resolution {
        let mut resolution = Resolution::default();
        for node in &mut tree.blocks {
            self.visit(node, &mut resolution);
        }
        resolution
    }

    fn visit(&self, node: &mut Node, resolution: &mut Resolution) {
        match node {
            Node::Image(image) => self.resolve_image(image, resolution),
            Node::Styled { children, .. }
            | Node::Panel { children, .. }
            | Node::Heading { children, .. }
            | Node::Paragraph(children) => {
                for child in children {
                    self.visit(child, resolution);
                }
            }
            Node::Link(link) => {
                for child in &mut link.label {
                    self.visit(child, resolution);
                }
            }
            Node::Table(table) => {
                for cell in table.rows.iter_mut().flat_map(|row| &mut row.cells) {
                    for child in &mut cell.children {
                        self.visit(child, resolution);
                    }
                }
            }
            Node::List { items, .. } => {
                for child in items.iter_mut().flatten() {
                    self.visit(child, resolution);
                }
            }
            Node::Text(_)
            | Node::LineBreak
            | Node::CodeBlock(_)
            | Node::Verbatim(_)
            | Node::Rule => {}
        }
    }

    fn resolve_image(&self, image: &mut Image, resolution: &mut Resolution) {
        match self.locate(&image.src) {
            Ok(mut asset) => {
                let known = resolution
                    .assets
                    .iter()
                    .find(|known| known.source == asset.source)
                    .map(|known| known.target_filename.clone());
                let target_filename = match known {
                    Some(name) => name,
                    None => {
                        asset.target_filename = self.unique_filename(&asset, &resolution.assets);
                        let name = asset.target_filename.clone();
                        resolution.assets.push(asset);
                        name
                    }
                };
                image.state = ImageState::Resolved { target_filename };
            }
            Err(reason) => {
                tracing::debug!(reference = %image.src, %reason, "Image reference unresolved");
                resolution.failures.push(ResolutionFailure {
                    reference: image.src.clone(),
                    reason: reason.clone(),
                });
                image.state = ImageState::Unresolved { reason };
            }
        }
    }

    /// Apply the resolution order to a single reference.
    pub fn locate(&self, reference: &str) -> Result<ResolvedAsset, String> {
        let reference_trimmed = reference.trim();
        if reference_trimmed.is_empty() {
            return Err("empty image reference".to_owned());
        }
        if let Some(attachment) = self.attachment(reference_trimmed) {
            return Ok(from_attachment(reference, attachment));
        }

        let url = if is_absolute_url(reference_trimmed) {
            reference_trimmed.to_owned()
        } else if reference_trimmed.starts_with('/') {
            let Some(base) = &self.base_url else {
                return Err(format!(
                    "root-relative reference '{reference_trimmed}' without a base URL"
                ));
            };
            format!("{base}{reference_trimmed}")
        } else {
            return Err(format!(
                "'{reference_trimmed}' matches no attachment and is not a URL"
            ));
        };

        let Some(target_filename) = url_filename(&url) else {
            return Err(format!("cannot derive a filename from '{url}'"));
        };
        // Exported images are stored locally under the same filename.
        if let Some(attachment) = self.exact.get(target_filename.as_str()) {
            return Ok(from_attachment(reference, attachment));
        }
        Ok(ResolvedAsset {
            original_reference: reference.to_owned(),
            source: AssetLocator::Url(url),
            target_filename,
            kind: AssetKind::Remote,
        })
    }

    /// Filename for a new asset, numbered (`image-1.png`) when another asset
    /// or a document attachment already uses the name.
    fn unique_filename(&self, asset: &ResolvedAsset, assets: &[ResolvedAsset]) -> String {
        let taken = |name: &str| {
            assets
                .iter()
                .any(|known| known.target_filename.eq_ignore_ascii_case(name))
                || (asset.kind == AssetKind::Remote
                    && self.folded.contains_key(&name.to_lowercase()))
        };
        let name = &asset.target_filename;
        if !taken(name) {
            return name.clone();
        }
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
            _ => (name.as_str(), None),
        };
        (1..)
            .map(|n| match extension {
                Some(extension) => format!("{stem}-{n}.{extension}"),
                None => format!("{stem}-{n}"),
            })
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| name.clone())
    }

    fn attachment(&self, name: &str) -> Option<&'a AttachmentRef> {
        self.exact
            .get(name)
            .or_else(|| self.folded.get(&name.to_lowercase()))
            .copied()
    }
}

fn from_attachment(reference: &str, attachment: &AttachmentRef) -> ResolvedAsset {
    ResolvedAsset {
        original_reference: reference.to_owned(),
        source: attachment.locator.clone(),
        target_filename: attachment.filename.clone(),
        kind: AssetKind::Attachment,
    }
}

fn is_absolute_url(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Last path segment of `url`, query and fragment removed, percent-decoded.
#[must_use]
pub fn url_filename(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path
        .split_once("://")
        .map_or(path, |(_, rest)| rest.split_once('/').map_or("", |(_, p)| p));
    let segment = path.rsplit('/').next().unwrap_or_default();
    if segment.is_empty() {
        return None;
    }
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Link;
    use crate::tree::LinkTarget;
    use pretty_assertions::assert_eq;

    fn attachments() -> Vec<AttachmentRef> {
        vec![
            AttachmentRef {
                filename: "Diagram.PNG".to_owned(),
                locator: AssetLocator::Url("https://r.example.com/attachments/download/5/Diagram.PNG".to_owned()),
                content_type: Some("image/png".to_owned()),
            },
            AttachmentRef::local("/export/Home_images/logo.svg"),
        ]
    }

    fn tree_with(images: &[&str]) -> ContentTree {
        ContentTree::new(vec![Node::Paragraph(
            images.iter().map(|src| Node::Image(Image::new(*src))).collect(),
        )])
    }

    fn states(tree: &ContentTree) -> Vec<ImageState> {
        tree.images().into_iter().map(|i| i.state.clone()).collect()
    }

    #[test]
    fn test_exact_match() {
        let attachments = attachments();
        let resolver = AssetResolver::new(&attachments);
        let mut tree = tree_with(&["Diagram.PNG"]);
        let resolution = resolver.resolve(&mut tree);

        assert_eq!(resolution.assets.len(), 1);
        assert_eq!(resolution.assets[0].kind, AssetKind::Attachment);
        assert_eq!(
            states(&tree),
            vec![ImageState::Resolved {
                target_filename: "Diagram.PNG".to_owned()
            }]
        );
    }

    #[test]
    fn test_case_insensitive_match_uses_stored_filename() {
        let attachments = attachments();
        let resolver = AssetResolver::new(&attachments);
        let mut tree = tree_with(&["diagram.png"]);
        let resolution = resolver.resolve(&mut tree);

        assert_eq!(resolution.assets[0].target_filename, "Diagram.PNG");
        assert_eq!(resolution.assets[0].original_reference, "diagram.png");
        assert_eq!(tree.images()[0].target_filename(), Some("Diagram.PNG"));
    }

    #[test]
    fn test_absolute_url_deferred() {
        let resolver = AssetResolver::new(&[]);
        let mut tree = tree_with(&["https://cdn.example.com/img/chart%201.png?v=2"]);
        let resolution = resolver.resolve(&mut tree);

        assert_eq!(
            resolution.assets,
            vec![ResolvedAsset {
                original_reference: "https://cdn.example.com/img/chart%201.png?v=2".to_owned(),
                source: AssetLocator::Url("https://cdn.example.com/img/chart%201.png?v=2".to_owned()),
                target_filename: "chart 1.png".to_owned(),
                kind: AssetKind::Remote,
            }]
        );
    }

    #[test]
    fn test_url_with_exported_copy_uses_local_file() {
        let attachments = attachments();
        let resolver = AssetResolver::new(&attachments);
        let asset = resolver
            .locate("https://elsewhere.example.com/static/logo.svg")
            .unwrap();
        assert_eq!(
            asset.source,
            AssetLocator::Path(PathBuf::from("/export/Home_images/logo.svg"))
        );
    }

    #[test]
    fn test_root_relative_joined_to_base() {
        let resolver = AssetResolver::new(&[]).with_base_url("https://r.example.com/");
        let asset = resolver.locate("/attachments/download/9/shot.jpg").unwrap();
        assert_eq!(
            asset.source,
            AssetLocator::Url("https://r.example.com/attachments/download/9/shot.jpg".to_owned())
        );
        assert_eq!(asset.target_filename, "shot.jpg");
    }

    #[test]
    fn test_unresolvable_kept_as_placeholder() {
        let resolver = AssetResolver::new(&[]);
        let mut tree = tree_with(&["missing.png", " "]);
        let resolution = resolver.resolve(&mut tree);

        assert!(resolution.assets.is_empty());
        assert_eq!(resolution.failures.len(), 2);
        assert_eq!(tree.images().len(), 2);
        assert!(
            states(&tree)
                .iter()
                .all(|s| matches!(s, ImageState::Unresolved { .. }))
        );
    }

    #[test]
    fn test_root_relative_without_base_fails() {
        let resolver = AssetResolver::new(&[]);
        assert!(resolver.locate("/x/y.png").is_err());
    }

    #[test]
    fn test_many_references_one_asset() {
        let attachments = attachments();
        let resolver = AssetResolver::new(&attachments);
        let mut tree = ContentTree::new(vec![
            Node::Paragraph(vec![Node::Image(Image::new("Diagram.PNG"))]),
            Node::Paragraph(vec![Node::Link(Link {
                target: LinkTarget::Url("https://x".to_owned()),
                label: vec![Node::Image(Image::new("DIAGRAM.png"))],
            })]),
        ]);
        let resolution = resolver.resolve(&mut tree);

        assert_eq!(resolution.assets.len(), 1);
        assert!(
            tree.images()
                .iter()
                .all(|i| i.target_filename() == Some("Diagram.PNG"))
        );
    }

    #[test]
    fn test_same_basename_from_different_sources() {
        let attachments = vec![AttachmentRef::local("/export/Home/Chart.png")];
        let resolver = AssetResolver::new(&attachments);
        let mut tree = tree_with(&[
            "http://a/x/image.png",
            "http://b/y/image.png",
            "http://a/x/image.png",
            "http://c/z/image.png",
            "https://d/chart.PNG",
        ]);
        let resolution = resolver.resolve(&mut tree);

        let names: Vec<&str> = resolution
            .assets
            .iter()
            .map(|a| a.target_filename.as_str())
            .collect();
        assert_eq!(names, vec!["image.png", "image-1.png", "image-2.png", "chart-1.PNG"]);
        assert_eq!(
            resolution.assets[1].source,
            AssetLocator::Url("http://b/y/image.png".to_owned())
        );
        let targets: Vec<Option<&str>> = tree.images().iter().map(|i| i.target_filename()).collect();
        assert_eq!(
            targets,
            vec![
                Some("image.png"),
                Some("image-1.png"),
                Some("image.png"),
                Some("image-2.png"),
                Some("chart-1.PNG"),
            ]
        );
    }

    #[test]
    fn test_url_filename() {
        assert_eq!(url_filename("https://h/a/b.png#frag"), Some("b.png".to_owned()));
        assert_eq!(url_filename("https://h/a/"), None);
        assert_eq!(url_filename("https://h"), None);
    }
}
