//! Intermediate document tree.
//!
//! A [`ContentTree`] is the single root of a document body. Every [`Node`]
//! owns its children, so a tree can never contain a cycle or a shared
//! subtree. Target assemblers walk this structure; they never look at the
//! source markup again.

/// Parsed body of one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTree {
    /// Top-level blocks in document order.
    pub blocks: Vec<Node>,
}

impl ContentTree {
    /// Create a tree from top-level blocks.
    #[must_use]
    pub fn new(blocks: Vec<Node>) -> Self {
        Self { blocks }
    }

    /// Whether the document has no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render the tree as plain text.
    ///
    /// Blocks are separated by a blank line so that paragraph detection on
    /// the result recovers the block boundaries.
    #[must_use]
    pub fn plain_text(&self) -> String {
        blocks_text(&self.blocks)
    }

    /// Visit every image in document order.
    pub fn images(&self) -> Vec<&Image> {
        let mut out = Vec::new();
        collect_images(&self.blocks, &mut out);
        out
    }
}

/// Inline emphasis styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Strong,
    Emphasis,
    Code,
    Deleted,
    Inserted,
    Superscript,
    Subscript,
}

/// Panel flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    /// Informational callout.
    Info,
    /// Quoted text (`bq.`).
    Quote,
}

/// Document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal text.
    Text(String),
    /// Styled inline run.
    Styled { style: Style, children: Vec<Node> },
    /// Hard line break inside a block.
    LineBreak,
    /// Hyperlink or cross-document reference.
    Link(Link),
    /// Embedded image.
    Image(Image),
    /// Preformatted code; its content is never rewritten.
    CodeBlock(CodeBlock),
    /// Raw text excluded from markup processing (`<notextile>`).
    Verbatim(String),
    /// Table.
    Table(Table),
    /// Callout or quotation.
    Panel { kind: PanelKind, children: Vec<Node> },
    /// Heading, level 1 to 6.
    Heading { level: u8, children: Vec<Node> },
    /// Paragraph of inline nodes.
    Paragraph(Vec<Node>),
    /// Bulleted or numbered list; each item is a sequence of nodes.
    List { ordered: bool, items: Vec<Vec<Node>> },
    /// Horizontal rule.
    Rule,
}

impl Node {
    /// Plain text node.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Text content of this node and its descendants.
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text(text) | Self::Verbatim(text) => text.clone(),
            Self::Styled { children, .. }
            | Self::Heading { children, .. }
            | Self::Paragraph(children) => inline_text(children),
            Self::Panel { children, .. } => blocks_text(children),
            Self::LineBreak => "\n".to_owned(),
            Self::Link(link) => {
                let label = inline_text(&link.label);
                if label.is_empty() {
                    link.target.display()
                } else {
                    label
                }
            }
            Self::Image(image) => image.display_name().to_owned(),
            Self::CodeBlock(code) => code.content.clone(),
            Self::Table(table) => table
                .rows
                .iter()
                .map(|row| {
                    row.cells
                        .iter()
                        .map(|cell| inline_text(&cell.children))
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::List { ordered, items } => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let marker = if *ordered {
                        format!("{}. ", i + 1)
                    } else {
                        "- ".to_owned()
                    };
                    format!("{marker}{}", item_text(item))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Rule => "----".to_owned(),
        }
    }
}

/// Where a link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Plain URL.
    Url(String),
    /// Source wiki page as written in the markup.
    WikiPage {
        page: String,
        anchor: Option<String>,
    },
    /// Target-system page addressed by its final title.
    Page {
        title: String,
        anchor: Option<String>,
    },
    /// Back-reference to a source issue.
    Issue { id: u64 },
}

impl LinkTarget {
    /// Human readable form used when a link has no label.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::WikiPage { page, .. } => page.clone(),
            Self::Page { title, .. } => title.clone(),
            Self::Issue { id } => format!("#{id}"),
        }
    }
}

/// Hyperlink node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub target: LinkTarget,
    pub label: Vec<Node>,
}

impl Link {
    /// Link whose label is plain text.
    pub fn new(target: LinkTarget, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            target,
            label: if label.is_empty() {
                Vec::new()
            } else {
                vec![Node::Text(label)]
            },
        }
    }

    /// Label as plain text, falling back to the target.
    #[must_use]
    pub fn label_text(&self) -> String {
        let label = inline_text(&self.label);
        if label.is_empty() {
            self.target.display()
        } else {
            label
        }
    }
}

/// Resolution state of an image reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageState {
    /// Not yet examined by the asset resolver.
    #[default]
    Pending,
    /// Backed by an attachment uploaded under `target_filename`.
    Resolved { target_filename: String },
    /// No asset could be found; rendered as a visible placeholder.
    Unresolved { reason: String },
}

/// Image node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Reference exactly as written in the source.
    pub src: String,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub state: ImageState,
}

impl Image {
    /// Image pointing at `src`, not yet resolved.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Self::default()
        }
    }

    /// Resolved attachment filename, if any.
    #[must_use]
    pub fn target_filename(&self) -> Option<&str> {
        match &self.state {
            ImageState::Resolved { target_filename } => Some(target_filename),
            _ => None,
        }
    }

    /// Short name for textual renderings.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.target_filename()
            .or(self.alt.as_deref())
            .unwrap_or(&self.src)
    }
}

/// Code block node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Language annotation as written (lower-cased).
    pub language: Option<String>,
    /// Exact code text.
    pub content: String,
}

/// Table node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

/// Table row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

/// Table cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCell {
    pub header: bool,
    pub children: Vec<Node>,
}

fn inline_text(nodes: &[Node]) -> String {
    nodes.iter().map(Node::plain_text).collect()
}

fn item_text(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(|node| match node {
            Node::List { .. } => format!("\n{}", node.plain_text()),
            other => other.plain_text(),
        })
        .collect()
}

fn blocks_text(blocks: &[Node]) -> String {
    blocks
        .iter()
        .map(Node::plain_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_images<'a>(nodes: &'a [Node], out: &mut Vec<&'a Image>) {
    for node in nodes {
        match node {
            Node::Image(image) => out.push(image),
            Node::Styled { children, .. }
            | Node::Panel { children, .. }
            | Node::Heading { children, .. }
            | Node::Paragraph(children) => collect_images(children, out),
            Node::Link(link) => collect_images(&link.label, out),
            Node::Table(table) => {
                for cell in table.rows.iter().flat_map(|r| &r.cells) {
                    collect_images(&cell.children, out);
                }
            }
            Node::List { items, .. } => {
                for item in items {
                    collect_images(item, out);
                }
            }
            Node::Text(_)
            | Node::LineBreak
            | Node::CodeBlock(_)
            | Node::Verbatim(_)
            | Node::Rule => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_separates_blocks() {
        let tree = ContentTree::new(vec![
            Node::Heading {
                level: 1,
                children: vec![Node::text("Title")],
            },
            Node::Paragraph(vec![
                Node::text("one"),
                Node::LineBreak,
                Node::text("two"),
            ]),
        ]);
        assert_eq!(tree.plain_text(), "Title\n\none\ntwo");
    }

    #[test]
    fn test_link_label_falls_back_to_target() {
        let link = Link::new(LinkTarget::Issue { id: 42 }, "");
        assert_eq!(link.label_text(), "#42");
    }

    #[test]
    fn test_images_found_inside_tables_and_links() {
        let tree = ContentTree::new(vec![Node::Table(Table {
            rows: vec![TableRow {
                cells: vec![TableCell {
                    header: false,
                    children: vec![Node::Link(Link {
                        target: LinkTarget::Url("https://x".to_owned()),
                        label: vec![Node::Image(Image::new("a.png"))],
                    })],
                }],
            }],
        })]);
        let images = tree.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].src, "a.png");
    }

    #[test]
    fn test_ordered_list_text() {
        let list = Node::List {
            ordered: true,
            items: vec![vec![Node::text("a")], vec![Node::text("b")]],
        };
        assert_eq!(list.plain_text(), "1. a\n2. b");
    }
}
