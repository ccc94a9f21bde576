//! Atlassian Document Format assembler.
//!
//! Issue descriptions are a metadata table, a migration notice panel and the
//! body converted node by node from the normalized content tree. Headings,
//! code blocks, tables, lists and panels keep their structure; inline styles
//! become marks. Nodes with no ADF counterpart fall back to their text.

use std::sync::LazyLock;

use redmig_markup::{CodeBlock, ContentTree, LinkTarget, Node, PanelKind, Style, Table};
use redmig_source::IssueRecord;
use regex::Regex;
use serde::Serialize;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("invalid paragraph break regex"));

/// Shown when an issue has no description.
const NO_DESCRIPTION: &str = "No description.";

/// ADF node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AdfNode {
    Doc {
        version: u32,
        content: Vec<AdfNode>,
    },
    Paragraph {
        content: Vec<AdfNode>,
    },
    Text {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        marks: Vec<Mark>,
    },
    HardBreak,
    Heading {
        attrs: HeadingAttrs,
        content: Vec<AdfNode>,
    },
    CodeBlock {
        attrs: CodeBlockAttrs,
        content: Vec<AdfNode>,
    },
    BulletList {
        content: Vec<AdfNode>,
    },
    OrderedList {
        content: Vec<AdfNode>,
    },
    ListItem {
        content: Vec<AdfNode>,
    },
    Rule,
    Panel {
        attrs: PanelAttrs,
        content: Vec<AdfNode>,
    },
    Table {
        content: Vec<AdfNode>,
    },
    TableRow {
        content: Vec<AdfNode>,
    },
    TableHeader {
        content: Vec<AdfNode>,
    },
    TableCell {
        content: Vec<AdfNode>,
    },
}

/// Text mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mark {
    Strong,
    Em,
    Code,
    Strike,
    Underline,
    Subsup { attrs: SubsupAttrs },
    Link { attrs: LinkAttrs },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelAttrs {
    pub panel_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingAttrs {
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlockAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsupAttrs {
    /// `sub` or `sup`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkAttrs {
    pub href: String,
}

impl AdfNode {
    /// Unmarked text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    /// Paragraph holding one text run.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph {
            content: vec![Self::text(text)],
        }
    }
}

/// Top-level document.
#[must_use]
pub fn document(content: Vec<AdfNode>) -> AdfNode {
    AdfNode::Doc {
        version: 1,
        content,
    }
}

/// Info panel with a single paragraph.
#[must_use]
pub fn info_panel(text: &str) -> AdfNode {
    AdfNode::Panel {
        attrs: PanelAttrs {
            panel_type: "info".to_owned(),
        },
        content: vec![AdfNode::paragraph(text)],
    }
}

/// Two-column `Field`/`Value` table; rows with an empty value are left out.
#[must_use]
pub fn metadata_table(rows: &[(String, String)]) -> AdfNode {
    let header = AdfNode::TableRow {
        content: vec![
            AdfNode::TableHeader {
                content: vec![AdfNode::paragraph("Field")],
            },
            AdfNode::TableHeader {
                content: vec![AdfNode::paragraph("Value")],
            },
        ],
    };
    let body = rows
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(field, value)| AdfNode::TableRow {
            content: vec![
                AdfNode::TableCell {
                    content: vec![AdfNode::paragraph(field.clone())],
                },
                AdfNode::TableCell {
                    content: vec![AdfNode::paragraph(value.clone())],
                },
            ],
        });
    AdfNode::Table {
        content: std::iter::once(header).chain(body).collect(),
    }
}

/// Split text into paragraphs on blank lines.
///
/// Single newlines inside a paragraph become hard breaks.
#[must_use]
pub fn paragraphs(text: &str) -> Vec<AdfNode> {
    PARAGRAPH_BREAK
        .split(text.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut content = Vec::new();
            for (i, line) in p.lines().enumerate() {
                if i > 0 {
                    content.push(AdfNode::HardBreak);
                }
                let line = line.trim_end();
                if !line.is_empty() {
                    content.push(AdfNode::text(line));
                }
            }
            AdfNode::Paragraph { content }
        })
        .collect()
}

/// Convert a content tree into ADF block nodes.
#[must_use]
pub fn tree_content(tree: &ContentTree) -> Vec<AdfNode> {
    blocks(&tree.blocks)
}

/// Block nodes for a sequence; runs of stray inline nodes are wrapped in
/// paragraphs.
fn blocks(nodes: &[Node]) -> Vec<AdfNode> {
    let mut out = Vec::new();
    let mut pending = Vec::new();
    for node in nodes {
        match block(node) {
            Some(converted) => {
                if !pending.is_empty() {
                    out.push(AdfNode::Paragraph {
                        content: std::mem::take(&mut pending),
                    });
                }
                out.push(converted);
            }
            None => inline(node, &[], &mut pending),
        }
    }
    if !pending.is_empty() {
        out.push(AdfNode::Paragraph { content: pending });
    }
    out
}

fn block(node: &Node) -> Option<AdfNode> {
    let converted = match node {
        Node::Heading { level, children } => AdfNode::Heading {
            attrs: HeadingAttrs {
                level: (*level).clamp(1, 6),
            },
            content: inlines(children),
        },
        Node::Paragraph(children) => AdfNode::Paragraph {
            content: inlines(children),
        },
        Node::CodeBlock(code) => code_block(code),
        Node::Verbatim(text) => AdfNode::Paragraph {
            content: text_runs(text, &[]),
        },
        Node::Table(table) => table_node(table),
        Node::Panel { kind, children } => AdfNode::Panel {
            attrs: PanelAttrs {
                panel_type: match kind {
                    PanelKind::Info => "info",
                    PanelKind::Quote => "note",
                }
                .to_owned(),
            },
            content: blocks(children),
        },
        Node::List { ordered, items } => {
            let content = items
                .iter()
                .map(|item| {
                    let mut content = blocks(item);
                    if content.is_empty() {
                        content.push(AdfNode::Paragraph {
                            content: Vec::new(),
                        });
                    }
                    AdfNode::ListItem { content }
                })
                .collect();
            if *ordered {
                AdfNode::OrderedList { content }
            } else {
                AdfNode::BulletList { content }
            }
        }
        Node::Rule => AdfNode::Rule,
        _ => return None,
    };
    Some(converted)
}

/// Code text is carried unchanged in a single text node.
fn code_block(code: &CodeBlock) -> AdfNode {
    let content = if code.content.is_empty() {
        Vec::new()
    } else {
        vec![AdfNode::text(code.content.clone())]
    };
    AdfNode::CodeBlock {
        attrs: CodeBlockAttrs {
            language: code.language.clone(),
        },
        content,
    }
}

fn table_node(table: &Table) -> AdfNode {
    let rows = table
        .rows
        .iter()
        .map(|row| AdfNode::TableRow {
            content: row
                .cells
                .iter()
                .map(|cell| {
                    let content = vec![AdfNode::Paragraph {
                        content: inlines(&cell.children),
                    }];
                    if cell.header {
                        AdfNode::TableHeader { content }
                    } else {
                        AdfNode::TableCell { content }
                    }
                })
                .collect(),
        })
        .collect();
    AdfNode::Table { content: rows }
}

fn inlines(nodes: &[Node]) -> Vec<AdfNode> {
    let mut out = Vec::new();
    for node in nodes {
        inline(node, &[], &mut out);
    }
    out
}

fn inline(node: &Node, marks: &[Mark], out: &mut Vec<AdfNode>) {
    match node {
        Node::Text(text) | Node::Verbatim(text) => out.extend(text_runs(text, marks)),
        Node::LineBreak => out.push(AdfNode::HardBreak),
        Node::Styled { style, children } => {
            let marks = with_style(marks, *style);
            for child in children {
                inline(child, &marks, out);
            }
        }
        Node::Link(link) => {
            let mut marks = marks.to_vec();
            if let LinkTarget::Url(href) = &link.target {
                marks.retain(|mark| !matches!(mark, Mark::Link { .. }));
                marks.push(Mark::Link {
                    attrs: LinkAttrs { href: href.clone() },
                });
            }
            if link.label.is_empty() {
                out.extend(text_runs(&link.label_text(), &marks));
            } else {
                for child in &link.label {
                    inline(child, &marks, out);
                }
            }
        }
        Node::Image(image) => out.extend(text_runs(image.display_name(), marks)),
        other => out.extend(text_runs(&other.plain_text(), marks)),
    }
}

/// Code marks only combine with links.
fn with_style(marks: &[Mark], style: Style) -> Vec<Mark> {
    let mark = match style {
        Style::Strong => Mark::Strong,
        Style::Emphasis => Mark::Em,
        Style::Code => Mark::Code,
        Style::Deleted => Mark::Strike,
        Style::Inserted => Mark::Underline,
        Style::Superscript | Style::Subscript => Mark::Subsup {
            attrs: SubsupAttrs {
                kind: if style == Style::Superscript { "sup" } else { "sub" }.to_owned(),
            },
        },
    };
    if marks.contains(&Mark::Code) {
        return marks.to_vec();
    }
    let mut marks = marks.to_vec();
    if mark == Mark::Code {
        marks.retain(|m| matches!(m, Mark::Link { .. }));
    }
    marks.retain(|m| std::mem::discriminant(m) != std::mem::discriminant(&mark));
    marks.push(mark);
    marks
}

/// Text nodes split on newlines into hard breaks; empty runs are dropped.
fn text_runs(text: &str, marks: &[Mark]) -> Vec<AdfNode> {
    let mut out = Vec::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push(AdfNode::HardBreak);
        }
        if !line.is_empty() {
            out.push(AdfNode::Text {
                text: line.to_owned(),
                marks: marks.to_vec(),
            });
        }
    }
    out
}

/// Metadata rows for an issue: fixed fields, non-empty custom fields, then
/// related issues.
#[must_use]
pub fn issue_metadata(issue: &IssueRecord, related: &[u64]) -> Vec<(String, String)> {
    let text = |v: Option<&str>| v.unwrap_or_default().to_owned();
    let mut rows = vec![
        ("Redmine ID".to_owned(), issue.id.to_string()),
        ("Author".to_owned(), text(issue.author_name())),
        ("Status".to_owned(), text(issue.status_name())),
        ("Tracker".to_owned(), text(issue.tracker_name())),
        ("Priority".to_owned(), text(issue.priority_name())),
        ("Assigned To".to_owned(), text(issue.assignee_name())),
        ("Created".to_owned(), text(issue.created_on.as_deref())),
        ("Updated".to_owned(), text(issue.updated_on.as_deref())),
    ];
    rows.extend(
        issue
            .custom_fields
            .iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned())),
    );
    if !related.is_empty() {
        let ids: Vec<String> = related.iter().map(|id| format!("#{id}")).collect();
        rows.push(("Related Issues".to_owned(), ids.join(", ")));
    }
    rows
}

/// Full description: metadata table, notice panel, then `body`.
#[must_use]
pub fn issue_description(
    metadata: &[(String, String)],
    notice: &str,
    body: Vec<AdfNode>,
) -> AdfNode {
    let mut content = vec![metadata_table(metadata), info_panel(notice)];
    if body.is_empty() {
        content.push(AdfNode::paragraph(NO_DESCRIPTION));
    } else {
        content.extend(body);
    }
    document(content)
}

/// First `limit` characters of `text`, with `...` when something was cut.
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_owned(),
    }
}
