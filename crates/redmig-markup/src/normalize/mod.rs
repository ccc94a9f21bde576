//! Textile to [`ContentTree`] conversion.
//!
//! Handles the Textile dialect found in Redmine wikis and issue descriptions:
//! block signatures (`h2.`, `bq.`, `bc.`), `<pre>`/`<code>` fences, tables,
//! nested lists, and the inline forms (emphasis, images, quoted links,
//! `[[wiki links]]`, `#123` issue references, a handful of raw HTML tags).
//!
//! Normalization is total. Anything that does not parse is kept as text.

mod block;
mod inline;

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::tree::ContentTree;

/// Deepest list or inline nesting that is parsed; deeper markup stays text.
pub(crate) const MAX_NESTING: usize = 32;

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("invalid entity regex")
});

/// Parse raw Textile into a content tree.
///
/// Line endings are normalized to `\n` first. Code fence content is kept
/// exactly, minus one newline directly inside each fence.
#[must_use]
pub fn normalize(raw: &str) -> ContentTree {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    ContentTree::new(block::parse_blocks(&text))
}

/// Decode HTML character references, leaving unknown ones untouched.
pub(crate) fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &Captures| decode_entity(&caps[1]))
}

fn decode_entity(entity: &str) -> String {
    match entity {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "quot" => "\"".to_owned(),
        "apos" => "'".to_owned(),
        "nbsp" => "\u{a0}".to_owned(),
        s if s.starts_with('#') => {
            let code = if s.starts_with("#x") || s.starts_with("#X") {
                u32::from_str_radix(&s[2..], 16).ok()
            } else {
                s[1..].parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map_or_else(|| format!("&{entity};"), |c| c.to_string())
        }
        _ => format!("&{entity};"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{CodeBlock, Link, LinkTarget, Node, Style};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_crlf_normalized() {
        let tree = normalize("line one\r\nline two\r\n\r\nnext");
        assert_eq!(
            tree.blocks,
            vec![
                Node::Paragraph(vec![
                    Node::text("line one"),
                    Node::LineBreak,
                    Node::text("line two"),
                ]),
                Node::Paragraph(vec![Node::text("next")]),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize("").is_empty());
        assert!(normalize("\n\n  \n").is_empty());
    }

    #[test]
    fn test_code_fence_keeps_wiki_syntax_literal() {
        let tree = normalize("<pre>\n[[SomePage]] and http://example.com\n</pre>");
        assert_eq!(
            tree.blocks,
            vec![Node::CodeBlock(CodeBlock {
                language: None,
                content: "[[SomePage]] and http://example.com".to_owned(),
            })]
        );
    }

    #[test]
    fn test_mixed_document() {
        let tree = normalize(
            "h1. Setup\n\nRead *this* first, see [[Install Guide|install]].\n\n<pre><code class=\"bash\">\nmake all\n</code></pre>",
        );
        assert_eq!(
            tree.blocks,
            vec![
                Node::Heading {
                    level: 1,
                    children: vec![Node::text("Setup")],
                },
                Node::Paragraph(vec![
                    Node::text("Read "),
                    Node::Styled {
                        style: Style::Strong,
                        children: vec![Node::text("this")],
                    },
                    Node::text(" first, see "),
                    Node::Link(Link::new(
                        LinkTarget::WikiPage {
                            page: "Install Guide".to_owned(),
                            anchor: None,
                        },
                        "install",
                    )),
                    Node::text("."),
                ]),
                Node::CodeBlock(CodeBlock {
                    language: Some("bash".to_owned()),
                    content: "make all".to_owned(),
                }),
            ]
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp; &#65;&#x42;"), "a <b> & AB");
        assert_eq!(decode_entities("&bogus; & alone"), "&bogus; & alone");
        assert!(matches!(decode_entities("plain"), Cow::Borrowed(_)));
    }
}
