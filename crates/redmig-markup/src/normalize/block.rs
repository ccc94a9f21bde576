//! Block-level Textile parsing.

use std::iter::Peekable;
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;

use super::{MAX_NESTING, decode_entities};
use super::inline::parse_inline;
use crate::tree::{CodeBlock, Node, PanelKind, Table, TableCell, TableRow};

/// Block signature: `h2.`, `p(class).`, `bc(ruby)..`, `bq.`, `notextile.`
static SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(h[1-6]|bq|bc|pre|p|notextile)((?:\([^)]*\)|\{[^}]*\}|\[[^\]]*\]|[<>=]+)*)(\.\.?)(?:\s+(.*))?$",
    )
    .expect("invalid block signature regex")
});

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([*#]+)\s+(.*)$").expect("invalid list item regex"));

static TABLE_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^table(?:\([^)]*\)|\{[^}]*\}|[<>=]+)*\.\s*$").expect("invalid table regex")
});

/// Cell modifiers such as `_.`, `\2.`, `{color:red}.`
static CELL_MODIFIERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:_|\\\d+|/\d+|<>|[<>=^~]|\{[^}]*\}|\([^)]*\))+)\.(?:\s+|$)")
        .expect("invalid cell modifier regex")
});

/// `{{info(text)}}` on one line, or the opening `{{info` of a multi-line macro.
static INFO_MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{(?i:info)(?:\((.*)\))?(\}\})?$").expect("invalid info macro regex")
});

static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{4,}$").expect("invalid rule regex"));

/// Split text into top-level blocks.
pub(crate) fn parse_blocks(text: &str) -> Vec<Node> {
    parse_panel_body(text, 0)
}

fn parse_panel_body(text: &str, depth: usize) -> Vec<Node> {
    let mut parser = BlockParser {
        lines: text.split('\n').collect(),
        pos: 0,
        depth,
        blocks: Vec::new(),
    };
    parser.run();
    parser.blocks
}

struct BlockParser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    /// Enclosing `{{info}}` macros.
    depth: usize,
    blocks: Vec<Node>,
}

/// A raw `<tag>...</tag>` region spanning one or more lines.
struct TaggedRegion {
    open_tag: String,
    inner: String,
    trailing: String,
}

impl<'a> BlockParser<'a> {
    fn run(&mut self) {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            let trimmed = line.trim();

            if trimmed.is_empty() {
                self.pos += 1;
            } else if starts_with_tag(trimmed, "pre") {
                self.pre_block();
            } else if starts_with_tag(trimmed, "notextile") {
                self.notextile_block();
            } else if self.depth < MAX_NESTING
                && let Some(caps) = INFO_MACRO.captures(trimmed)
            {
                let args = caps.get(1).map(|m| m.as_str().to_owned());
                self.info_block(args.as_deref(), caps.get(2).is_some());
            } else if let Some(caps) = SIGNATURE.captures(trimmed) {
                let kind = caps.get(1).map_or("", |m| m.as_str());
                let attrs = caps.get(2).map_or("", |m| m.as_str());
                let extended = caps.get(3).is_some_and(|m| m.as_str() == "..");
                let first = caps.get(4).map_or("", |m| m.as_str());
                self.pos += 1;
                self.signature_block(kind, attrs, extended, first);
            } else if TABLE_SIGNATURE.is_match(trimmed) {
                self.pos += 1;
            } else if trimmed.starts_with('|') {
                self.table_block();
            } else if list_marker(trimmed).is_some() {
                self.list_block();
            } else if RULE.is_match(trimmed) {
                self.blocks.push(Node::Rule);
                self.pos += 1;
            } else {
                let lines = self.take_paragraph_lines();
                self.push_paragraph(&lines.join("\n"));
            }
        }
    }

    fn push_paragraph(&mut self, text: &str) {
        let children = parse_inline(text.trim());
        if !children.is_empty() {
            self.blocks.push(Node::Paragraph(children));
        }
    }

    /// Lines of a plain paragraph, stopping before anything that opens a
    /// new block.
    fn take_paragraph_lines(&mut self) -> Vec<&'a str> {
        let mut lines = vec![self.lines[self.pos]];
        self.pos += 1;
        while let Some(line) = self.lines.get(self.pos).copied() {
            let trimmed = line.trim();
            if trimmed.is_empty()
                || starts_with_tag(trimmed, "pre")
                || starts_with_tag(trimmed, "notextile")
                || INFO_MACRO.is_match(trimmed)
                || list_marker(trimmed).is_some()
                || trimmed.starts_with('|')
            {
                break;
            }
            lines.push(line);
            self.pos += 1;
        }
        lines
    }

    /// Lines following a signature line, up to the next blank line.
    fn take_until_blank(&mut self) -> Vec<&'a str> {
        let mut lines = Vec::new();
        while let Some(line) = self.lines.get(self.pos).copied() {
            if line.trim().is_empty() {
                break;
            }
            lines.push(line);
            self.pos += 1;
        }
        lines
    }

    /// Lines of an extended (`..`) block, up to the next block signature.
    fn take_extended(&mut self) -> Vec<&'a str> {
        let mut lines = Vec::new();
        while let Some(line) = self.lines.get(self.pos).copied() {
            if SIGNATURE.is_match(line.trim()) {
                break;
            }
            lines.push(line);
            self.pos += 1;
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        lines
    }

    fn signature_block(&mut self, kind: &str, attrs: &str, extended: bool, first: &'a str) {
        let mut lines = vec![first];
        if extended && matches!(kind, "bc" | "pre" | "notextile") {
            lines.extend(self.take_extended());
        } else {
            lines.extend(self.take_until_blank());
        }
        let text = lines.join("\n");

        match kind {
            "bc" | "pre" => {
                self.blocks.push(Node::CodeBlock(CodeBlock {
                    language: language_from_attrs(attrs),
                    content: text,
                }));
            }
            "notextile" => self.blocks.push(Node::Verbatim(text)),
            "bq" => {
                let children = parse_inline(text.trim());
                self.blocks.push(Node::Panel {
                    kind: PanelKind::Quote,
                    children: vec![Node::Paragraph(children)],
                });
            }
            "p" => self.push_paragraph(&text),
            heading => {
                let level = heading[1..].parse::<u8>().unwrap_or(1);
                self.blocks.push(Node::Heading {
                    level,
                    children: parse_inline(text.trim()),
                });
            }
        }
    }

    fn pre_block(&mut self) {
        let region = self.take_tagged("pre");
        let mut language = class_language(&region.open_tag);
        let mut content = region.inner.as_str();

        let trimmed = content.trim();
        if starts_with_tag(trimmed, "code")
            && trimmed.to_ascii_lowercase().ends_with("</code>")
            && let Some(open_end) = trimmed.find('>')
            && open_end + 1 + "</code>".len() <= trimmed.len()
        {
            language = class_language(&trimmed[..=open_end]).or(language);
            content = &trimmed[open_end + 1..trimmed.len() - "</code>".len()];
        }

        let content = strip_fence_newlines(content);
        self.blocks.push(Node::CodeBlock(CodeBlock {
            language,
            content: decode_entities(content).into_owned(),
        }));
        self.push_paragraph(&region.trailing);
    }

    /// Info panel. A macro left open on its first line wraps the blocks up
    /// to the matching `}}` line, or the end of the document.
    fn info_block(&mut self, args: Option<&str>, closed: bool) {
        self.pos += 1;
        let mut children = Vec::new();
        if let Some(args) = args.map(str::trim).filter(|a| !a.is_empty()) {
            children.push(Node::Paragraph(parse_inline(args)));
        }

        if !closed {
            let start = self.pos;
            let mut open = 1;
            while let Some(line) = self.lines.get(self.pos) {
                let trimmed = line.trim();
                if trimmed == "}}" {
                    open -= 1;
                    if open == 0 {
                        break;
                    }
                } else if INFO_MACRO
                    .captures(trimmed)
                    .is_some_and(|caps| caps.get(2).is_none())
                {
                    open += 1;
                }
                self.pos += 1;
            }
            let body = self.lines[start..self.pos].join("\n");
            if self.pos < self.lines.len() {
                self.pos += 1;
            }
            children.extend(parse_panel_body(&body, self.depth + 1));
        }

        self.blocks.push(Node::Panel {
            kind: PanelKind::Info,
            children,
        });
    }

    fn notextile_block(&mut self) {
        let region = self.take_tagged("notextile");
        let content = strip_fence_newlines(&region.inner);
        self.blocks.push(Node::Verbatim(content.to_owned()));
        self.push_paragraph(&region.trailing);
    }

    /// Consume `<tag ...>` through `</tag>`. An unclosed tag runs to the end
    /// of the document.
    fn take_tagged(&mut self, tag: &str) -> TaggedRegion {
        let close = format!("</{tag}>");
        let first = self.lines[self.pos].trim_start();
        let open_end = first.find('>').map_or(first.len(), |i| i + 1);
        let open_tag = first[..open_end].to_owned();

        let mut inner = String::new();
        let mut trailing = String::new();
        let mut segment = &first[open_end..];
        loop {
            let lower = segment.to_ascii_lowercase();
            if let Some(idx) = lower.find(&close) {
                inner.push_str(&segment[..idx]);
                trailing = segment[idx + close.len()..].to_owned();
                self.pos += 1;
                break;
            }
            inner.push_str(segment);
            self.pos += 1;
            match self.lines.get(self.pos) {
                Some(next) => {
                    inner.push('\n');
                    segment = *next;
                }
                None => break,
            }
        }

        TaggedRegion {
            open_tag,
            inner,
            trailing,
        }
    }

    fn table_block(&mut self) {
        let mut table = Table::default();
        while let Some(line) = self.lines.get(self.pos) {
            let trimmed = line.trim();
            if !trimmed.starts_with('|') {
                break;
            }
            table.rows.push(parse_row(trimmed));
            self.pos += 1;
        }
        self.blocks.push(Node::Table(table));
    }

    fn list_block(&mut self) {
        let mut entries: Vec<ListEntry> = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some((depth, ordered, text)) = list_marker(trimmed) {
                entries.push(ListEntry {
                    depth,
                    ordered,
                    content: parse_inline(text),
                });
            } else if trimmed.starts_with('|') || starts_with_tag(trimmed, "pre") {
                break;
            } else if let Some(last) = entries.last_mut() {
                last.content.push(Node::LineBreak);
                last.content.extend(parse_inline(trimmed));
            }
            self.pos += 1;
        }

        let min_depth = entries.iter().map(|e| e.depth).min().unwrap_or(1);
        let mut iter = entries.into_iter().peekable();
        while iter.peek().is_some() {
            self.blocks.push(build_list(&mut iter, min_depth));
        }
    }
}

struct ListEntry {
    depth: usize,
    ordered: bool,
    content: Vec<Node>,
}

/// Depth, ordering and text of a list line. A line nested deeper than
/// [`MAX_NESTING`] is not a list item.
fn list_marker(line: &str) -> Option<(usize, bool, &str)> {
    let caps = LIST_ITEM.captures(line)?;
    let markers = caps.get(1).map_or("", |m| m.as_str());
    if markers.len() > MAX_NESTING {
        return None;
    }
    let text = caps.get(2).map_or("", |m| m.as_str());
    Some((markers.len(), markers.ends_with('#'), text))
}

fn build_list<I: Iterator<Item = ListEntry>>(entries: &mut Peekable<I>, depth: usize) -> Node {
    let mut ordered = None;
    let mut items: Vec<Vec<Node>> = Vec::new();

    while let Some(entry) = entries.peek() {
        if entry.depth < depth {
            break;
        }
        if entry.depth == depth {
            let Some(entry) = entries.next() else { break };
            ordered.get_or_insert(entry.ordered);
            items.push(entry.content);
        } else {
            let nested = build_list(entries, depth + 1);
            match items.last_mut() {
                Some(item) => item.push(nested),
                None => items.push(vec![nested]),
            }
        }
    }

    Node::List {
        ordered: ordered.unwrap_or(false),
        items,
    }
}

fn parse_row(line: &str) -> TableRow {
    let body = line.strip_prefix('|').unwrap_or(line);
    let body = body.strip_suffix('|').unwrap_or(body);
    let cells = split_cells(body)
        .into_iter()
        .map(|raw| {
            let raw = raw.trim();
            match CELL_MODIFIERS.captures(raw) {
                Some(caps) => {
                    let modifiers = caps.get(1).map_or("", |m| m.as_str());
                    let end = caps.get(0).map_or(0, |m| m.end());
                    TableCell {
                        header: is_header_modifier(modifiers),
                        children: parse_inline(raw[end..].trim()),
                    }
                }
                None => TableCell {
                    header: false,
                    children: parse_inline(raw),
                },
            }
        })
        .collect();
    TableRow { cells }
}

/// Split a row on `|`, ignoring pipes inside `[[...]]`.
fn split_cells(body: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' if bytes.get(i + 1) == Some(&b'[') => {
                depth += 1;
                i += 1;
            }
            b']' if bytes.get(i + 1) == Some(&b']') && depth > 0 => {
                depth -= 1;
                i += 1;
            }
            b'|' if depth == 0 => {
                cells.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    cells.push(&body[start..]);
    cells
}

fn is_header_modifier(modifiers: &str) -> bool {
    let mut nesting = 0i32;
    for c in modifiers.chars() {
        match c {
            '{' | '(' => nesting += 1,
            '}' | ')' => nesting -= 1,
            '_' if nesting == 0 => return true,
            _ => {}
        }
    }
    false
}

/// `(ruby)` in a block signature names the code language.
fn language_from_attrs(attrs: &str) -> Option<String> {
    let start = attrs.find('(')?;
    let end = attrs[start..].find(')')? + start;
    first_token(&attrs[start + 1..end])
}

/// Language from the `class` attribute of an opening tag.
fn class_language(open_tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(open_tag);
    let class = match reader.read_event() {
        Ok(Event::Start(e) | Event::Empty(e)) => e
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref().eq_ignore_ascii_case(b"class"))
            .map(|a| {
                a.unescape_value().map_or_else(
                    |_| String::from_utf8_lossy(&a.value).into_owned(),
                    std::borrow::Cow::into_owned,
                )
            }),
        _ => None,
    }?;
    first_token(&class)
}

fn first_token(class: &str) -> Option<String> {
    let token = class.split_whitespace().next()?;
    let token = token
        .strip_prefix("language-")
        .or_else(|| token.strip_prefix("lang-"))
        .unwrap_or(token);
    if token.is_empty() {
        None
    } else {
        Some(token.to_lowercase())
    }
}

/// Whether `text` opens with `<tag>` or `<tag ...>`, case-insensitively.
fn starts_with_tag(text: &str, tag: &str) -> bool {
    let Some(rest) = text.strip_prefix('<') else {
        return false;
    };
    if rest.len() < tag.len() || !rest.is_char_boundary(tag.len()) {
        return false;
    }
    let (name, after) = rest.split_at(tag.len());
    name.eq_ignore_ascii_case(tag) && after.starts_with(|c: char| c == '>' || c.is_whitespace())
}

/// Drop the newline that directly follows an opening fence and the one that
/// directly precedes the closing fence.
fn strip_fence_newlines(content: &str) -> &str {
    let content = content.strip_prefix('\n').unwrap_or(content);
    content.strip_suffix('\n').unwrap_or(content)
}
