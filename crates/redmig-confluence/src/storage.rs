//! Confluence storage format assembler.
//!
//! Produces XHTML with `ac:`/`ri:` macros from a [`ContentTree`]:
//! - `code` structured macro with a CDATA body for code blocks
//! - `info` macro for info panels, `<blockquote>` for quotes
//! - `ac:image` with `ri:attachment` for resolved images
//! - `ac:link` with `ri:page` for links to other migrated pages
//!
//! Every node renders to something; there is no error path.

use quick_xml::escape::{escape, partial_escape};
use redmig_markup::{ContentTree, Image, ImageState, Link, LinkTarget, Node, PanelKind, Style};

/// Placeholder for an image with an empty reference.
const MISSING_IMAGE: &str = "[missing image]";

/// Render a tree as storage-format XHTML.
#[must_use]
pub fn to_storage(tree: &ContentTree) -> String {
    let mut out = String::new();
    render_blocks(&tree.blocks, &mut out);
    out.retain(is_xml_char);
    out
}

/// Body used when the full page is refused as too large.
#[must_use]
pub fn fallback_body(title: &str, attachment: &str) -> String {
    let mut out = String::new();
    info_panel(
        &format!(
            "The page \"{title}\" was too large to import. \
             The original content is attached as {attachment}."
        ),
        &mut out,
    );
    out.retain(is_xml_char);
    out
}

/// Canonical language token for the code macro.
#[must_use]
pub fn code_language(language: &str) -> String {
    let lower = language.trim().to_lowercase();
    match lower.as_str() {
        "bash" | "shell" | "zsh" | "console" | "sh" => "sh".to_owned(),
        "c#" | "cs" => "csharp".to_owned(),
        "js" => "javascript".to_owned(),
        "py" => "python".to_owned(),
        "yml" => "yaml".to_owned(),
        "ps1" | "posh" => "powershell".to_owned(),
        _ => lower,
    }
}

/// Wrap text in a CDATA section, splitting any `]]>` it contains.
#[must_use]
pub fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

/// Characters allowed in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn is_block(node: &Node) -> bool {
    matches!(
        node,
        Node::CodeBlock(_)
            | Node::Table(_)
            | Node::Panel { .. }
            | Node::Heading { .. }
            | Node::Paragraph(_)
            | Node::List { .. }
            | Node::Rule
    )
}

/// Render block-level content; stray inline runs are wrapped in `<p>`.
fn render_blocks(nodes: &[Node], out: &mut String) {
    let mut inline: Vec<&Node> = Vec::new();
    for node in nodes {
        if is_block(node) {
            flush_inline(&mut inline, out);
            render_node(node, out);
        } else {
            inline.push(node);
        }
    }
    flush_inline(&mut inline, out);
}

fn flush_inline(inline: &mut Vec<&Node>, out: &mut String) {
    if inline.is_empty() {
        return;
    }
    out.push_str("<p>");
    for node in inline.drain(..) {
        render_node(node, out);
    }
    out.push_str("</p>");
}

fn render_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        render_node(node, out);
    }
}

fn render_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Node::Verbatim(text) => {
            let escaped = partial_escape(text.as_str());
            out.push_str(&escaped.replace('\n', "<br />"));
        }
        Node::LineBreak => out.push_str("<br />"),
        Node::Styled { style, children } => {
            let tag = style_tag(*style);
            out.push('<');
            out.push_str(tag);
            out.push('>');
            render_nodes(children, out);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Node::Link(link) => render_link(link, out),
        Node::Image(image) => render_image(image, out),
        Node::CodeBlock(code) => code_macro(code.language.as_deref(), &code.content, out),
        Node::Table(table) => {
            out.push_str("<table><tbody>");
            for row in &table.rows {
                out.push_str("<tr>");
                for cell in &row.cells {
                    let tag = if cell.header { "th" } else { "td" };
                    out.push('<');
                    out.push_str(tag);
                    out.push('>');
                    render_nodes(&cell.children, out);
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
                out.push_str("</tr>");
            }
            out.push_str("</tbody></table>");
        }
        Node::Panel {
            kind: PanelKind::Info,
            children,
        } => {
            out.push_str(r#"<ac:structured-macro ac:name="info"><ac:rich-text-body>"#);
            render_blocks(children, out);
            out.push_str("</ac:rich-text-body></ac:structured-macro>");
        }
        Node::Panel {
            kind: PanelKind::Quote,
            children,
        } => {
            out.push_str("<blockquote>");
            render_blocks(children, out);
            out.push_str("</blockquote>");
        }
        Node::Heading { level, children } => {
            let level = (*level).clamp(1, 6);
            out.push_str(&format!("<h{level}>"));
            render_nodes(children, out);
            out.push_str(&format!("</h{level}>"));
        }
        Node::Paragraph(children) => {
            out.push_str("<p>");
            render_nodes(children, out);
            out.push_str("</p>");
        }
        Node::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            out.push('<');
            out.push_str(tag);
            out.push('>');
            for item in items {
                out.push_str("<li>");
                render_nodes(item, out);
                out.push_str("</li>");
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Node::Rule => out.push_str("<hr />"),
    }
}

fn style_tag(style: Style) -> &'static str {
    match style {
        Style::Strong => "strong",
        Style::Emphasis => "em",
        Style::Code => "code",
        Style::Deleted => "del",
        Style::Inserted => "ins",
        Style::Superscript => "sup",
        Style::Subscript => "sub",
    }
}

fn code_macro(language: Option<&str>, content: &str, out: &mut String) {
    out.push_str(r#"<ac:structured-macro ac:name="code">"#);
    if let Some(lang) = language.filter(|l| !l.trim().is_empty()) {
        out.push_str(r#"<ac:parameter ac:name="language">"#);
        out.push_str(&escape(code_language(lang).as_str()));
        out.push_str("</ac:parameter>");
    }
    out.push_str(r#"<ac:parameter ac:name="theme">Default</ac:parameter>"#);
    out.push_str("<ac:plain-text-body>");
    out.push_str(&cdata(content));
    out.push_str("</ac:plain-text-body></ac:structured-macro>");
}

fn info_panel(text: &str, out: &mut String) {
    out.push_str(r#"<ac:structured-macro ac:name="info"><ac:rich-text-body><p>"#);
    out.push_str(&partial_escape(text));
    out.push_str("</p></ac:rich-text-body></ac:structured-macro>");
}

fn page_link(title: &str, anchor: Option<&str>, label: &str, out: &mut String) {
    out.push_str("<ac:link");
    if let Some(anchor) = anchor {
        out.push_str(&format!(r#" ac:anchor="{}""#, escape(anchor)));
    }
    out.push_str(&format!(r#"><ri:page ri:content-title="{}"/>"#, escape(title)));
    out.push_str("<ac:plain-text-link-body>");
    out.push_str(&cdata(&label.replace(['\r', '\n'], " ")));
    out.push_str("</ac:plain-text-link-body></ac:link>");
}

fn render_link(link: &Link, out: &mut String) {
    match &link.target {
        LinkTarget::Page { title, anchor }
        | LinkTarget::WikiPage {
            page: title,
            anchor,
        } => page_link(title, anchor.as_deref(), &link.label_text(), out),
        LinkTarget::Url(url) => {
            out.push_str(&format!(r#"<a href="{}">"#, escape(url.as_str())));
            if link.label.is_empty() {
                out.push_str(&partial_escape(url.as_str()));
            } else {
                render_nodes(&link.label, out);
            }
            out.push_str("</a>");
        }
        LinkTarget::Issue { .. } => out.push_str(&partial_escape(link.label_text().as_str())),
    }
}

fn render_image(image: &Image, out: &mut String) {
    match &image.state {
        ImageState::Resolved { target_filename } => {
            let filename = escape(target_filename.as_str());
            let alt = image
                .alt
                .as_deref()
                .filter(|alt| !alt.trim().is_empty())
                .unwrap_or(target_filename);
            out.push_str(&format!(
                r#"<ac:image><ri:attachment ri:filename="{filename}"/><ac:alt>{}</ac:alt></ac:image>"#,
                partial_escape(alt)
            ));
        }
        ImageState::Pending | ImageState::Unresolved { .. } => {
            if image.src.trim().is_empty() {
                out.push_str(MISSING_IMAGE);
                return;
            }
            let alt = image.alt.as_deref().unwrap_or(&image.src);
            out.push_str(&format!(
                r#"<img src="{}" alt="{}"/>"#,
                escape(image.src.as_str()),
                escape(alt)
            ));
        }
    }
}
