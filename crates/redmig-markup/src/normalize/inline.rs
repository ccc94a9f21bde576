//! Inline Textile parsing.
//!
//! A left-to-right scanner. At each position it tries the inline constructs
//! that can start with the current character; when none matches the
//! character is kept as text.

use quick_xml::Reader;
use quick_xml::events::Event;

use super::{MAX_NESTING, decode_entities};
use crate::tree::{Image, Link, LinkTarget, Node, Style};

/// Parse inline markup into nodes.
pub(crate) fn parse_inline(text: &str) -> Vec<Node> {
    parse_nested(text, 0)
}

/// `depth` counts the enclosing styles and link labels.
fn parse_nested(text: &str, depth: usize) -> Vec<Node> {
    let mut out = InlineBuffer::default();
    let mut pos = 0;
    let mut word_start = 0;
    let mut in_url = false;
    let mut prev: Option<char> = None;

    while let Some(c) = text[pos..].chars().next() {
        let rest = &text[pos..];
        let parsed = if in_url && c != '\n' && c != '<' {
            None
        } else {
            construct(rest, prev, depth)
        };

        let start = pos;
        if let Some((node, consumed)) = parsed {
            out.push_node(node);
            prev = rest[..consumed].chars().next_back();
            pos += consumed;
        } else {
            out.text.push(c);
            prev = Some(c);
            pos += c.len_utf8();
        }

        if prev.is_some_and(char::is_whitespace) {
            word_start = pos;
            in_url = false;
        } else if !in_url {
            // Only the new characters and the two before them can complete
            // a `://` inside the current word.
            let mut from = start.saturating_sub(2).max(word_start);
            while !text.is_char_boundary(from) {
                from -= 1;
            }
            in_url = text[from..pos].contains("://");
        }
    }

    out.finish()
}

#[derive(Default)]
struct InlineBuffer {
    nodes: Vec<Node>,
    text: String,
}

impl InlineBuffer {
    fn flush(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.nodes.push(Node::Text(decode_entities(&text).into_owned()));
        }
    }

    fn push_node(&mut self, node: Node) {
        self.flush();
        self.nodes.push(node);
    }

    fn finish(mut self) -> Vec<Node> {
        self.flush();
        self.nodes
    }
}

fn construct(rest: &str, prev: Option<char>, depth: usize) -> Option<(Node, usize)> {
    let nests = depth < MAX_NESTING;
    match rest.as_bytes().first()? {
        b'\n' => Some((Node::LineBreak, 1)),
        b'[' => wiki_link(rest),
        b'!' => image(rest, prev),
        b'"' if nests => quoted_link(rest, depth),
        b'<' => html_tag(rest, depth),
        b'@' => code_span(rest, prev),
        b'#' => issue_reference(rest, prev),
        b'*' | b'_' | b'-' | b'+' | b'^' | b'~' if nests => styled(rest, prev, depth),
        _ => None,
    }
}

/// Opening delimiters must not be glued to a preceding word.
fn opens_after(prev: Option<char>) -> bool {
    prev.is_none_or(|c| !c.is_alphanumeric())
}

/// `[[Page]]`, `[[Page|Label]]`, `[[Page#anchor|Label]]`, `[[project:Page]]`
fn wiki_link(rest: &str) -> Option<(Node, usize)> {
    let inner_len = rest.strip_prefix("[[")?.find("]]")?;
    let inner = &rest[2..2 + inner_len];
    if inner.trim().is_empty() || inner.contains('\n') || inner.contains('[') {
        return None;
    }

    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target, Some(label.trim())),
        None => (inner, None),
    };
    let (page, anchor) = match target.split_once('#') {
        Some((page, anchor)) => (page, Some(anchor.trim().to_owned())),
        None => (target, None),
    };
    let page = strip_project(page.trim());
    if page.is_empty() {
        return None;
    }

    let label = label.filter(|l| !l.is_empty()).unwrap_or(page);
    let link = Link::new(
        LinkTarget::WikiPage {
            page: page.to_owned(),
            anchor: anchor.filter(|a| !a.is_empty()),
        },
        label,
    );
    Some((Node::Link(link), inner_len + 4))
}

/// Drop a `project:` qualifier from a wiki link target.
fn strip_project(page: &str) -> &str {
    match page.split_once(':') {
        Some((project, name))
            if !project.is_empty()
                && !name.trim().is_empty()
                && project
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            name.trim()
        }
        _ => page,
    }
}

/// `!src!`, `!<{width:50%}src(title)!`, `!src!:href`
fn image(rest: &str, prev: Option<char>) -> Option<(Node, usize)> {
    if !opens_after(prev) {
        return None;
    }
    let body_len = rest[1..].find(['!', '\n'])?;
    if !rest[1 + body_len..].starts_with('!') {
        return None;
    }
    let mut body = &rest[1..=body_len];

    body = body.trim_start_matches(['<', '>', '=']);
    loop {
        let group_end = match body.chars().next() {
            Some('{') => body.find('}'),
            Some('(') => body.find(')').filter(|&end| end + 1 < body.len()),
            _ => None,
        };
        match group_end {
            Some(end) => body = &body[end + 1..],
            None => break,
        }
    }

    let (src, title) = match body.strip_suffix(')').and_then(|b| b.rsplit_once('(')) {
        Some((src, title)) => (src, Some(title.trim().to_owned())),
        None => (body, None),
    };
    if src.is_empty() || src.contains(char::is_whitespace) {
        return None;
    }

    let image = Image {
        src: src.to_owned(),
        alt: title.clone().filter(|t| !t.is_empty()),
        title: title.filter(|t| !t.is_empty()),
        ..Image::default()
    };

    let mut consumed = body_len + 2;
    if let Some(href) = rest[consumed..].strip_prefix(':').and_then(url_prefix) {
        consumed += 1 + href.len();
        let link = Link {
            target: LinkTarget::Url(href.to_owned()),
            label: vec![Node::Image(image)],
        };
        return Some((Node::Link(link), consumed));
    }
    Some((Node::Image(image), consumed))
}

/// `"label":url`
fn quoted_link(rest: &str, depth: usize) -> Option<(Node, usize)> {
    let close = rest[1..].find(['"', '\n'])?;
    if !rest[1 + close..].starts_with('"') || close == 0 {
        return None;
    }
    let label = &rest[1..=close];
    let url = rest[close + 2..].strip_prefix(':').and_then(url_prefix)?;

    let label = match label.strip_suffix(')').and_then(|l| l.rsplit_once('(')) {
        Some((text, _title)) if !text.trim().is_empty() => text.trim_end(),
        _ => label,
    };
    let link = Link {
        target: LinkTarget::Url(url.to_owned()),
        label: parse_nested(label, depth + 1),
    };
    Some((Node::Link(link), close + 3 + url.len()))
}

/// Leading URL of `text`, without trailing sentence punctuation.
fn url_prefix(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| c.is_whitespace() || c == '"' || c == '<')
        .unwrap_or(text.len());
    let mut url = &text[..end];
    loop {
        let Some(last) = url.chars().next_back() else {
            break;
        };
        let unbalanced_paren = last == ')' && url.matches('(').count() < url.matches(')').count();
        if matches!(last, '.' | ',' | ';' | ':' | '!' | '?') || unbalanced_paren {
            url = &url[..url.len() - 1];
        } else {
            break;
        }
    }
    if url.is_empty() { None } else { Some(url) }
}

/// `<a>`, `<img>`, `<code>` and `<br>`.
fn html_tag(rest: &str, depth: usize) -> Option<(Node, usize)> {
    let tag_end = rest.find('>')?;
    let tag = &rest[..=tag_end];
    let name: String = tag[1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match name.as_str() {
        "br" => Some((Node::LineBreak, tag_end + 1)),
        "img" => {
            let attrs = tag_attributes(tag);
            let src = attribute(&attrs, "src")?;
            let image = Image {
                src: src.to_owned(),
                alt: attribute(&attrs, "alt").map(str::to_owned),
                title: attribute(&attrs, "title").map(str::to_owned),
                ..Image::default()
            };
            Some((Node::Image(image), tag_end + 1))
        }
        "a" if depth < MAX_NESTING => {
            let attrs = tag_attributes(tag);
            let href = attribute(&attrs, "href")?;
            let (inner, consumed) = enclosed(rest, tag_end + 1, "a")?;
            let link = Link {
                target: LinkTarget::Url(href.to_owned()),
                label: parse_nested(inner, depth + 1),
            };
            Some((Node::Link(link), consumed))
        }
        "code" => {
            let (inner, consumed) = enclosed(rest, tag_end + 1, "code")?;
            let code = Node::Styled {
                style: Style::Code,
                children: vec![Node::Text(decode_entities(inner).into_owned())],
            };
            Some((code, consumed))
        }
        _ => None,
    }
}

/// Content between an opening tag ending at `start` and `</tag>`.
fn enclosed<'a>(rest: &'a str, start: usize, tag: &str) -> Option<(&'a str, usize)> {
    let close = format!("</{tag}>");
    let idx = rest[start..].to_ascii_lowercase().find(&close)?;
    Some((&rest[start..start + idx], start + idx + close.len()))
}

fn tag_attributes(tag: &str) -> Vec<(String, String)> {
    let mut reader = Reader::from_str(tag);
    match reader.read_event() {
        Ok(Event::Start(e) | Event::Empty(e)) => e
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
                let value = attr.unescape_value().map_or_else(
                    |_| String::from_utf8_lossy(&attr.value).into_owned(),
                    std::borrow::Cow::into_owned,
                );
                (key, value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `@code@`
fn code_span(rest: &str, prev: Option<char>) -> Option<(Node, usize)> {
    if !opens_after(prev) {
        return None;
    }
    let close = rest[1..].find(['@', '\n'])?;
    if close == 0 || !rest[1 + close..].starts_with('@') {
        return None;
    }
    let inner = &rest[1..=close];
    if inner.starts_with(char::is_whitespace) {
        return None;
    }
    if rest[close + 2..]
        .chars()
        .next()
        .is_some_and(char::is_alphanumeric)
    {
        return None;
    }
    let code = Node::Styled {
        style: Style::Code,
        children: vec![Node::Text(decode_entities(inner).into_owned())],
    };
    Some((code, close + 2))
}

/// Redmine `#123` issue shorthand.
fn issue_reference(rest: &str, prev: Option<char>) -> Option<(Node, usize)> {
    if !opens_after(prev) || prev == Some('&') {
        return None;
    }
    let digits = rest[1..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len() - 1);
    if digits == 0 {
        return None;
    }
    if rest[1 + digits..]
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        return None;
    }
    let id = rest[1..=digits].parse().ok()?;
    let link = Link::new(LinkTarget::Issue { id }, &rest[..=digits]);
    Some((Node::Link(link), digits + 1))
}

/// `*strong*`, `**bold**`, `_em_`, `__italic__`, `-del-`, `+ins+`, `^sup^`, `~sub~`
fn styled(rest: &str, prev: Option<char>, depth: usize) -> Option<(Node, usize)> {
    if !opens_after(prev) {
        return None;
    }
    let marker = rest.chars().next()?;
    let (style, width) = match marker {
        '*' if rest.starts_with("**") => (Style::Strong, 2),
        '*' => (Style::Strong, 1),
        '_' if rest.starts_with("__") => (Style::Emphasis, 2),
        '_' => (Style::Emphasis, 1),
        '-' => (Style::Deleted, 1),
        '+' => (Style::Inserted, 1),
        '^' => (Style::Superscript, 1),
        '~' => (Style::Subscript, 1),
        _ => return None,
    };
    let delim = &rest[..width];
    let body = &rest[width..];
    let first = body.chars().next()?;
    if first.is_whitespace() || first == marker {
        return None;
    }

    let mut search = 1;
    while let Some(found) = body.get(search..).and_then(|s| s.find(delim)) {
        let close = search + found;
        let inner = &body[..close];
        let before = inner.chars().next_back();
        let after = body[close + width..].chars().next();
        if inner.contains("\n\n") {
            return None;
        }
        if before.is_some_and(|c| !c.is_whitespace())
            && after.is_none_or(|c| !c.is_alphanumeric() && c != marker)
        {
            let node = Node::Styled {
                style,
                children: parse_nested(inner, depth + 1),
            };
            return Some((node, close + 2 * width));
        }
        search = close + width;
    }
    None
}
