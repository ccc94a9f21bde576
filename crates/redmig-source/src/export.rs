//! On-disk export layout.
//!
//! The export directory is the hand-off between `export-wiki` and the
//! importers. Per wiki page:
//!
//! ```text
//! {safe}.json          raw Redmine response
//! {safe}.txt           header lines, "\n---\n\n", raw Textile
//! {safe}_attachments/  page attachments
//! {safe}_images/       embedded images downloaded from URLs
//! {safe}.html          assembled body written by a dry run
//! ```
//!
//! Issue directories hold `issue_{id}.json`, optional `issue_{id}.txt` and
//! `issue_{id}_comments.txt`, and `issue_{id}_attachments/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use redmig_markup::AttachmentRef;
use regex::Regex;

use crate::document::SourceDocument;
use crate::error::SourceError;
use crate::issue::{IssueBundle, IssueRecord};

/// Separator between the header and the body of a page text file.
const BODY_SEPARATOR: &str = "\n---\n\n";
const UNKNOWN: &str = "Unknown";
const NO_PARENT: &str = "None";

static ISSUE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^issue_(\d+)\.json$").expect("invalid issue file regex"));

/// Replace characters that are not allowed in file names with `_`.
pub fn safe_filename(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// Paths belonging to one exported page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePaths {
    pub json: PathBuf,
    pub text: PathBuf,
    pub html: PathBuf,
    pub attachments_dir: PathBuf,
    pub images_dir: PathBuf,
}

/// Page read back from an export directory.
#[derive(Debug, Clone)]
pub struct ExportedPage {
    /// Document with attachments pointing at the local files.
    pub document: SourceDocument,
    pub paths: PagePaths,
    /// Attachment names listed in the header but absent on disk.
    pub missing_attachments: Vec<String>,
}

/// Export directory.
#[derive(Debug, Clone)]
pub struct ExportStore {
    dir: PathBuf,
}

impl ExportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the export directory if needed.
    pub fn ensure_dir(&self) -> Result<(), SourceError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Paths for the page with the given title.
    pub fn page_paths(&self, title: &str) -> PagePaths {
        let safe = safe_filename(title);
        PagePaths {
            json: self.dir.join(format!("{safe}.json")),
            text: self.dir.join(format!("{safe}.txt")),
            html: self.dir.join(format!("{safe}.html")),
            attachments_dir: self.dir.join(format!("{safe}_attachments")),
            images_dir: self.dir.join(format!("{safe}_images")),
        }
    }

    /// Write the raw response and the text file of a page.
    pub fn write_page(&self, doc: &SourceDocument, raw_json: &str) -> Result<PagePaths, SourceError> {
        let paths = self.page_paths(&doc.title);
        fs::write(&paths.json, raw_json)?;
        fs::write(&paths.text, render_page_text(doc))?;
        Ok(paths)
    }

    /// Store a downloaded file in one of the page's asset directories.
    pub fn write_asset(&self, dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf, SourceError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(safe_filename(filename));
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Write the assembled body of a page next to its text file.
    pub fn write_html(&self, title: &str, html: &str) -> Result<PathBuf, SourceError> {
        let path = self.page_paths(title).html;
        fs::write(&path, html)?;
        Ok(path)
    }

    /// Read every page text file, sorted by file name.
    pub fn read_pages(&self) -> Result<Vec<ExportedPage>, SourceError> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "txt")
            })
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with("issue_"))
            })
            .collect();
        files.sort();

        files.iter().map(|path| self.read_page(path)).collect()
    }

    /// Read one page text file and bind its local asset files.
    pub fn read_page(&self, path: &Path) -> Result<ExportedPage, SourceError> {
        let text = fs::read_to_string(path)?;
        let (mut document, listed) = parse_page_text(&text).map_err(|message| {
            SourceError::InvalidExport {
                path: path.display().to_string(),
                message,
            }
        })?;
        let paths = self.page_paths(&document.title);

        let mut attachments = list_files(&paths.attachments_dir)?;
        attachments.extend(list_files(&paths.images_dir)?);
        let missing_attachments = listed
            .into_iter()
            .filter(|name| !attachments.iter().any(|a| a.filename == safe_filename(name)))
            .collect::<Vec<_>>();
        for name in &missing_attachments {
            tracing::debug!(page = %document.title, attachment = %name, "Attachment not on disk");
        }
        document.attachments = attachments;

        Ok(ExportedPage {
            document,
            paths,
            missing_attachments,
        })
    }

    /// Read every `issue_{id}.json` with its side files, sorted by id.
    pub fn read_issues(&self) -> Result<Vec<IssueBundle>, SourceError> {
        let mut ids: Vec<(u64, PathBuf)> = fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let caps = ISSUE_FILE.captures(name.to_str()?)?;
                let id = caps[1].parse().ok()?;
                Some((id, entry.path()))
            })
            .collect();
        ids.sort_by_key(|(id, _)| *id);

        ids.into_iter()
            .map(|(id, json_path)| self.read_issue(id, json_path))
            .collect()
    }

    fn read_issue(&self, id: u64, json_path: PathBuf) -> Result<IssueBundle, SourceError> {
        let json = fs::read_to_string(&json_path)?;
        let record = IssueRecord::parse(&json).map_err(|e| SourceError::InvalidExport {
            path: json_path.display().to_string(),
            message: e.to_string(),
        })?;
        if record.id != id {
            tracing::warn!(file = %json_path.display(), id = record.id, "Issue id differs from file name");
        }
        let existing = |name: String| Some(self.dir.join(name)).filter(|p| p.is_file());
        Ok(IssueBundle {
            text_path: existing(format!("issue_{id}.txt")),
            comments_path: existing(format!("issue_{id}_comments.txt")),
            attachments: list_files(&self.dir.join(format!("issue_{id}_attachments")))?,
            record,
            json_path,
        })
    }
}

/// Local files of a directory as attachments, sorted; empty when absent.
fn list_files(dir: &Path) -> Result<Vec<AttachmentRef>, SourceError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files.into_iter().map(AttachmentRef::local).collect())
}

/// Render the text file of a page: header lines, separator, raw body.
pub fn render_page_text(doc: &SourceDocument) -> String {
    let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_owned());
    let attachments: Vec<&str> = doc.attachments.iter().map(|a| a.filename.as_str()).collect();
    let comments = doc
        .comments
        .as_deref()
        .unwrap_or_default()
        .replace(['\r', '\n'], " ");

    let mut out = String::new();
    out.push_str(&format!("Title: {}\n", doc.title));
    out.push_str(&format!("Author: {}\n", or_unknown(&doc.author)));
    out.push_str(&format!("Created On: {}\n", or_unknown(&doc.created_on)));
    out.push_str(&format!("Last Updated: {}\n", or_unknown(&doc.updated_on)));
    out.push_str(&format!("Version: {}\n", or_unknown(&doc.version)));
    out.push_str(&format!(
        "Parent Page: {}\n",
        doc.parent.as_deref().unwrap_or(NO_PARENT)
    ));
    out.push_str(&format!("Comments: {comments}\n"));
    out.push_str(&format!(
        "Attachments: {}\n",
        serde_json::Value::from(attachments)
    ));
    out.push_str(&format!(
        "Fields: {}\n",
        serde_json::to_value(&doc.fields).unwrap_or_default()
    ));
    out.push_str(BODY_SEPARATOR);
    out.push_str(&doc.body);
    out
}

/// Header and body of a page text file. The separator and the blank line
/// after it may end in `\r\n`; the body is returned as stored.
fn split_page_text(text: &str) -> Option<(&str, &str)> {
    let mut start = 0;
    let mut previous: Option<(usize, &str)> = None;
    for line in text.split_inclusive('\n') {
        if let Some((separator_start, separator)) = previous
            && separator_start > 0
            && matches!(separator, "---\n" | "---\r\n")
            && matches!(line, "\n" | "\r\n")
        {
            return Some((&text[..separator_start], &text[start + line.len()..]));
        }
        previous = Some((start, line));
        start += line.len();
    }
    None
}

/// Parse a page text file into a document and the attachment names it lists.
///
/// Attachments are not bound here; see [`ExportStore::read_page`].
pub fn parse_page_text(text: &str) -> Result<(SourceDocument, Vec<String>), String> {
    let (header, body) =
        split_page_text(text).ok_or_else(|| "missing header separator".to_owned())?;

    let mut values: BTreeMap<&str, &str> = BTreeMap::new();
    for line in header.lines() {
        if let Some((key, value)) = line.split_once(':') {
            values.entry(key.trim()).or_insert(value.trim());
        }
    }

    let title = values
        .get("Title")
        .filter(|t| !t.is_empty())
        .map(|t| (*t).to_owned())
        .ok_or_else(|| "missing Title header".to_owned())?;
    let known = |key: &str| {
        values
            .get(key)
            .filter(|v| !v.is_empty() && **v != UNKNOWN)
            .map(|v| (*v).to_owned())
    };
    let fields = match values.get("Fields") {
        Some(raw) if !raw.is_empty() => {
            serde_json::from_str(raw).map_err(|e| format!("invalid Fields header: {e}"))?
        }
        _ => BTreeMap::new(),
    };

    let document = SourceDocument {
        id: title.clone(),
        title,
        body: body.to_owned(),
        author: known("Author"),
        created_on: known("Created On"),
        updated_on: known("Last Updated"),
        version: known("Version"),
        parent: known("Parent Page").filter(|p| p != NO_PARENT),
        comments: known("Comments"),
        attachments: Vec::new(),
        fields,
    };
    let listed = values
        .get("Attachments")
        .map(|raw| parse_name_list(raw))
        .unwrap_or_default();
    Ok((document, listed))
}

/// Parse an attachment name list: a JSON array, or the bracketed list with
/// single quotes written by older exports.
fn parse_name_list(raw: &str) -> Vec<String> {
    if let Ok(names) = serde_json::from_str::<Vec<String>>(raw) {
        return names;
    }
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_owned())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use redmig_markup::AssetLocator;
    use tempfile::TempDir;

    use super::*;

    fn page(title: &str, parent: Option<&str>) -> SourceDocument {
        SourceDocument {
            id: title.to_owned(),
            title: title.to_owned(),
            body: "h1. Setup\n\n---\n\nStill body: yes".to_owned(),
            author: Some("Dana Smith".to_owned()),
            created_on: Some("2019-03-01T10:00:00Z".to_owned()),
            updated_on: None,
            version: Some("4".to_owned()),
            parent: parent.map(str::to_owned),
            comments: Some("fix\ntypo".to_owned()),
            attachments: vec![AttachmentRef {
                filename: "setup.png".to_owned(),
                locator: AssetLocator::Url("https://r/attachments/download/1/setup.png".to_owned()),
                content_type: None,
            }],
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(safe_filename("Install_Guide"), "Install_Guide");
    }

    #[test]
    fn test_render_page_text() {
        let text = render_page_text(&page("Install_Guide", Some("Wiki")));
        assert_eq!(
            text,
            "Title: Install_Guide\n\
             Author: Dana Smith\n\
             Created On: 2019-03-01T10:00:00Z\n\
             Last Updated: Unknown\n\
             Version: 4\n\
             Parent Page: Wiki\n\
             Comments: fix typo\n\
             Attachments: [\"setup.png\"]\n\
             Fields: {}\n\
             \n---\n\n\
             h1. Setup\n\n---\n\nStill body: yes"
        );
    }

    #[test]
    fn test_page_text_reads_back() {
        let original = page("Install_Guide", None);
        let (doc, listed) = parse_page_text(&render_page_text(&original)).unwrap();

        assert_eq!(doc.title, "Install_Guide");
        assert_eq!(doc.body, original.body);
        assert_eq!(doc.author, original.author);
        assert_eq!(doc.created_on, original.created_on);
        assert_eq!(doc.updated_on, None);
        assert_eq!(doc.version.as_deref(), Some("4"));
        assert_eq!(doc.parent, None);
        assert_eq!(doc.comments.as_deref(), Some("fix typo"));
        assert_eq!(listed, vec!["setup.png"]);
    }

    #[test]
    fn test_crlf_body_reads_back_unchanged() {
        let mut original = page("Install_Guide", None);
        original.body = "h1. Setup\r\n\r\n---\r\n\r\nline one\r\nline two\r\n".to_owned();
        let (doc, _) = parse_page_text(&render_page_text(&original)).unwrap();
        assert_eq!(doc.body, original.body);

        let text = "Title: Wiki\r\nVersion: 2\r\n\r\n---\r\n\r\nbody\r\nmore";
        let (doc, _) = parse_page_text(text).unwrap();
        assert_eq!(doc.title, "Wiki");
        assert_eq!(doc.version.as_deref(), Some("2"));
        assert_eq!(doc.body, "body\r\nmore");
    }

    #[test]
    fn test_parse_legacy_attachment_list() {
        let text = "Title: Wiki\nParent Page: None\nAttachments: ['a.png', 'b c.pdf']\n\n---\n\nbody";
        let (doc, listed) = parse_page_text(text).unwrap();
        assert_eq!(listed, vec!["a.png", "b c.pdf"]);
        assert_eq!(doc.parent, None);
        assert!(doc.fields.is_empty());
    }

    #[test]
    fn test_parse_requires_separator_and_title() {
        assert!(parse_page_text("Title: x\nbody").is_err());
        assert!(parse_page_text("Author: x\n\n---\n\nbody").is_err());
    }

    #[test]
    fn test_store_round_trip_binds_local_files() {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        let doc = page("Ops/Runbook", Some("Wiki"));

        let paths = store.write_page(&doc, r#"{"wiki_page":{}}"#).unwrap();
        assert_eq!(paths.text, temp.path().join("Ops_Runbook.txt"));
        store
            .write_asset(&paths.attachments_dir, "setup.png", b"png")
            .unwrap();
        store
            .write_asset(&paths.images_dir, "remote.gif", b"gif")
            .unwrap();

        let pages = store.read_pages().unwrap();
        assert_eq!(pages.len(), 1);
        let read = &pages[0];
        assert_eq!(read.document.title, "Ops/Runbook");
        assert_eq!(read.document.parent.as_deref(), Some("Wiki"));
        let names: Vec<&str> = read
            .document
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(names, vec!["setup.png", "remote.gif"]);
        assert!(read.missing_attachments.is_empty());
        assert_eq!(
            read.document.attachments[0].locator,
            AssetLocator::Path(temp.path().join("Ops_Runbook_attachments/setup.png"))
        );
    }

    #[test]
    fn test_missing_attachment_reported() {
        let temp = TempDir::new().unwrap();
        let store = ExportStore::new(temp.path());
        store.write_page(&page("Wiki", None), "{}").unwrap();

        let pages = store.read_pages().unwrap();
        assert_eq!(pages[0].missing_attachments, vec!["setup.png"]);
        assert!(pages[0].document.attachments.is_empty());
    }

    #[test]
    fn test_read_issues() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("issue_12.json"), r#"{"id": 12, "subject": "b"}"#).unwrap();
        fs::write(dir.join("issue_3.json"), r#"{"issue": {"id": 3, "subject": "a"}}"#).unwrap();
        fs::write(dir.join("issue_3.txt"), "text").unwrap();
        fs::write(dir.join("issue_3_comments.txt"), "comments").unwrap();
        fs::create_dir(dir.join("issue_3_attachments")).unwrap();
        fs::write(dir.join("issue_3_attachments/log.txt"), "log").unwrap();
        fs::write(dir.join("notes.json"), "{}").unwrap();

        let issues = ExportStore::new(dir).read_issues().unwrap();
        let ids: Vec<u64> = issues.iter().map(|i| i.record.id).collect();
        assert_eq!(ids, vec![3, 12]);
        assert_eq!(issues[0].text_path, Some(dir.join("issue_3.txt")));
        assert_eq!(issues[0].comments_path, Some(dir.join("issue_3_comments.txt")));
        assert_eq!(issues[0].attachments.len(), 1);
        assert_eq!(issues[1].text_path, None);
        assert!(issues[1].attachments.is_empty());
    }

    #[test]
    fn test_read_issue_invalid_json() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("issue_1.json"), "not json").unwrap();
        let err = ExportStore::new(temp.path()).read_issues().unwrap_err();
        assert!(matches!(err, SourceError::InvalidExport { .. }));
    }
}
