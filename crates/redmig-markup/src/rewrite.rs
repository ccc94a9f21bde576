//! Cross-document reference rewriting.
//!
//! Turns source-system references into target-system ones:
//!
//! - wiki links, and anchors pointing at the origin wiki, become page links
//!   addressed by their migrated title;
//! - issue references become a search link or stay as back-references;
//! - bare URLs in text become links showing the same text.
//!
//! Code blocks, verbatim blocks and inline code are never touched. No remote
//! lookups happen here, so a link may point at a page that is created later.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::tree::{ContentTree, Link, LinkTarget, Node, Style, TableCell};

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"')]+"#).expect("invalid bare URL regex"));

static WIKI_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/projects/[^/?#]+/wiki/([^/?#]+)/?(?:\?[^#]*)?(?:#(.*))?$")
        .expect("invalid wiki path regex")
});

static ISSUE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/issues/(\d+)/?(?:[?#].*)?$").expect("invalid issue path regex")
});

/// Maps source page names to target titles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleTransform {
    suffix: String,
    underscore_spaces: bool,
}

impl TitleTransform {
    /// Append `suffix` to every page title.
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            underscore_spaces: false,
        }
    }

    /// Replace spaces with underscores, the way the source system stores titles.
    #[must_use]
    pub fn underscore_spaces(mut self) -> Self {
        self.underscore_spaces = true;
        self
    }

    /// Target title for a page name as written in a link.
    #[must_use]
    pub fn apply(&self, page: &str) -> String {
        let name = clean_page_name(page);
        let name = if self.underscore_spaces {
            name.replace(' ', "_")
        } else {
            name
        };
        format!("{name}{}", self.suffix)
    }

    /// Target title for a source document title.
    #[must_use]
    pub fn title_for(&self, source_title: &str) -> String {
        format!("{source_title}{}", self.suffix)
    }
}

/// How issue references are emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueLinkMode {
    /// Link to a search URL; `{id}` in the template is replaced by the issue id.
    Search { url_template: String },
    /// Keep [`LinkTarget::Issue`] so the assembler can emit a typed reference.
    BackReference,
}

/// What a rewrite pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Distinct target titles linked to, in first-seen order.
    pub page_links: Vec<String>,
    /// Distinct issue ids referenced, in first-seen order.
    pub issue_references: Vec<u64>,
}

impl RewriteSummary {
    fn page(&mut self, title: &str) {
        if !self.page_links.iter().any(|t| t == title) {
            self.page_links.push(title.to_owned());
        }
    }

    fn issue(&mut self, id: u64) {
        if !self.issue_references.contains(&id) {
            self.issue_references.push(id);
        }
    }
}

/// Rewrites links in a [`ContentTree`] for one target system.
#[derive(Debug, Clone)]
pub struct ReferenceRewriter {
    origin: Option<String>,
    titles: TitleTransform,
    issues: IssueLinkMode,
}

impl ReferenceRewriter {
    /// Rewriter for content exported from `origin_base_url`.
    pub fn new(origin_base_url: Option<&str>) -> Self {
        Self {
            origin: origin_base_url
                .map(|url| url.trim_end_matches('/').to_owned())
                .filter(|url| !url.is_empty()),
            titles: TitleTransform::default(),
            issues: IssueLinkMode::BackReference,
        }
    }

    #[must_use]
    pub fn title_transform(mut self, titles: TitleTransform) -> Self {
        self.titles = titles;
        self
    }

    #[must_use]
    pub fn issue_links(mut self, mode: IssueLinkMode) -> Self {
        self.issues = mode;
        self
    }

    /// Rewrite every reference in `tree`.
    pub fn rewrite(&self, tree: &mut ContentTree) -> RewriteSummary {
        let mut summary = RewriteSummary::default();
        let blocks = std::mem::take(&mut tree.blocks);
        tree.blocks = self.rewrite_nodes(blocks, &mut summary);
        summary
    }

    fn rewrite_nodes(&self, nodes: Vec<Node>, summary: &mut RewriteSummary) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.rewrite_node(node, &mut out, summary);
        }
        out
    }

    fn rewrite_node(&self, node: Node, out: &mut Vec<Node>, summary: &mut RewriteSummary) {
        match node {
            Node::Text(text) => autolink(&text, out),
            Node::Styled { style, children } if style != Style::Code => out.push(Node::Styled {
                style,
                children: self.rewrite_nodes(children, summary),
            }),
            Node::Link(link) => out.push(Node::Link(self.rewrite_link(link, summary))),
            Node::Table(mut table) => {
                for row in &mut table.rows {
                    let cells = std::mem::take(&mut row.cells);
                    row.cells = cells
                        .into_iter()
                        .map(|cell| TableCell {
                            header: cell.header,
                            children: self.rewrite_nodes(cell.children, summary),
                        })
                        .collect();
                }
                out.push(Node::Table(table));
            }
            Node::Panel { kind, children } => out.push(Node::Panel {
                kind,
                children: self.rewrite_nodes(children, summary),
            }),
            Node::Heading { level, children } => out.push(Node::Heading {
                level,
                children: self.rewrite_nodes(children, summary),
            }),
            Node::Paragraph(children) => {
                out.push(Node::Paragraph(self.rewrite_nodes(children, summary)));
            }
            Node::List { ordered, items } => out.push(Node::List {
                ordered,
                items: items
                    .into_iter()
                    .map(|item| self.rewrite_nodes(item, summary))
                    .collect(),
            }),
            other @ (Node::Styled { .. }
            | Node::LineBreak
            | Node::Image(_)
            | Node::CodeBlock(_)
            | Node::Verbatim(_)
            | Node::Rule) => out.push(other),
        }
    }

    fn rewrite_link(&self, link: Link, summary: &mut RewriteSummary) -> Link {
        let target = match link.target {
            LinkTarget::WikiPage { page, anchor } => self.page_target(&page, anchor, summary),
            LinkTarget::Issue { id } => self.issue_target(id, summary),
            LinkTarget::Url(href) => self.href_target(href, summary),
            page @ LinkTarget::Page { .. } => page,
        };
        Link {
            target,
            label: relabel(link.label),
        }
    }

    fn page_target(
        &self,
        page: &str,
        anchor: Option<String>,
        summary: &mut RewriteSummary,
    ) -> LinkTarget {
        let title = self.titles.apply(page);
        summary.page(&title);
        LinkTarget::Page { title, anchor }
    }

    fn issue_target(&self, id: u64, summary: &mut RewriteSummary) -> LinkTarget {
        summary.issue(id);
        match &self.issues {
            IssueLinkMode::Search { url_template } => {
                LinkTarget::Url(url_template.replace("{id}", &id.to_string()))
            }
            IssueLinkMode::BackReference => LinkTarget::Issue { id },
        }
    }

    fn href_target(&self, href: String, summary: &mut RewriteSummary) -> LinkTarget {
        let Some(path) = self.origin_path(&href) else {
            return LinkTarget::Url(href);
        };
        if let Some(caps) = WIKI_PATH.captures(path) {
            let anchor = caps
                .get(2)
                .map(|m| m.as_str())
                .filter(|a| !a.is_empty())
                .map(str::to_owned);
            return self.page_target(&caps[1], anchor, summary);
        }
        if let Some(id) = ISSUE_PATH
            .captures(path)
            .and_then(|caps| caps[1].parse().ok())
        {
            return self.issue_target(id, summary);
        }
        match &self.origin {
            Some(origin) if href.starts_with('/') => LinkTarget::Url(format!("{origin}{href}")),
            _ => LinkTarget::Url(href),
        }
    }

    /// Path part of `href` when it points into the origin system.
    fn origin_path<'h>(&self, href: &'h str) -> Option<&'h str> {
        if href.starts_with('/') && !href.starts_with("//") {
            return Some(href);
        }
        let origin = strip_scheme(self.origin.as_deref()?)?;
        let rest = strip_scheme(href)?;
        let prefix = rest.get(..origin.len())?;
        if !prefix.eq_ignore_ascii_case(origin) {
            return None;
        }
        let path = &rest[origin.len()..];
        (path.is_empty() || path.starts_with('/')).then_some(path)
    }
}

fn strip_scheme(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")).then_some(rest)
}

/// Page name as the target expects it.
fn clean_page_name(page: &str) -> String {
    let page = page.split('#').next().unwrap_or(page);
    let decoded = percent_decode_str(page.trim()).decode_utf8_lossy();
    decoded.trim().trim_end_matches(':').trim_end().to_owned()
}

/// Square brackets would be read as markup by the targets.
fn relabel(label: Vec<Node>) -> Vec<Node> {
    label
        .into_iter()
        .map(|node| match node {
            Node::Text(text) => Node::Text(text.replace('[', "(").replace(']', ")")),
            Node::Styled { style, children } => Node::Styled {
                style,
                children: relabel(children),
            },
            other => other,
        })
        .collect()
}

/// Split `text` around bare URLs, turning each into a link.
fn autolink(text: &str, out: &mut Vec<Node>) {
    let mut last = 0;
    for found in BARE_URL.find_iter(text) {
        let url = found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if url.len() <= "https://".len() {
            continue;
        }
        if found.start() > last {
            out.push(Node::text(&text[last..found.start()]));
        }
        out.push(Node::Link(Link::new(LinkTarget::Url(url.to_owned()), url)));
        last = found.start() + url.len();
    }
    if last < text.len() {
        out.push(Node::text(&text[last..]));
    }
}
