//! Source documents and the Redmine wiki API payloads they come from.

use std::collections::BTreeMap;

use redmig_markup::{AssetLocator, AttachmentRef};
use serde::Deserialize;

/// Wiki page or issue as exported from Redmine.
///
/// Immutable once fetched. Optional metadata is `None` when Redmine did not
/// report it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    /// Page title for wiki pages, numeric id for issues.
    pub id: String,
    pub title: String,
    /// Raw Textile.
    pub body: String,
    pub author: Option<String>,
    pub created_on: Option<String>,
    pub updated_on: Option<String>,
    pub version: Option<String>,
    /// Title of the parent page.
    pub parent: Option<String>,
    /// Change comment of the current version.
    pub comments: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub fields: BTreeMap<String, String>,
}

/// `{id, name}` reference used throughout the Redmine API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
}

/// Attachment metadata from the Redmine API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedmineAttachment {
    #[serde(default)]
    pub id: Option<u64>,
    pub filename: String,
    #[serde(default)]
    pub content_url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl RedmineAttachment {
    /// Attachment reference pointing at the download URL.
    ///
    /// Returns `None` when Redmine did not provide a URL.
    pub fn to_attachment_ref(&self) -> Option<AttachmentRef> {
        let url = self.content_url.as_ref().filter(|u| !u.is_empty())?;
        Some(AttachmentRef {
            filename: self.filename.clone(),
            locator: AssetLocator::Url(url.clone()),
            content_type: self.content_type.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WikiIndexResponse {
    #[serde(default)]
    pub wiki_pages: Vec<WikiIndexEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WikiIndexEntry {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WikiPageResponse {
    pub wiki_page: WikiPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParentRef {
    pub title: String,
}

/// Wiki page from `GET /projects/{p}/wiki/{title}.json?include=attachments`.
#[derive(Debug, Clone, Deserialize)]
pub struct WikiPage {
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub author: Option<NamedRef>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub updated_on: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub parent: Option<ParentRef>,
    #[serde(default)]
    pub attachments: Vec<RedmineAttachment>,
}

impl WikiPage {
    /// Convert into a source document whose attachments point at Redmine URLs.
    pub fn to_document(&self) -> SourceDocument {
        SourceDocument {
            id: self.title.clone(),
            title: self.title.clone(),
            body: self.text.clone(),
            author: self.author.as_ref().map(|a| a.name.clone()),
            created_on: self.created_on.clone(),
            updated_on: self.updated_on.clone(),
            version: self.version.map(|v| v.to_string()),
            parent: self.parent.as_ref().map(|p| p.title.clone()),
            comments: self.comments.clone().filter(|c| !c.is_empty()),
            attachments: self
                .attachments
                .iter()
                .filter_map(RedmineAttachment::to_attachment_ref)
                .collect(),
            fields: BTreeMap::new(),
        }
    }
}

/// Wiki page together with the raw response it was parsed from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub page: WikiPage,
    /// Response body, stored verbatim in the export.
    pub raw: String,
}

impl FetchedPage {
    /// Parse a `{"wiki_page": {...}}` response.
    pub fn parse(raw: String) -> Result<Self, serde_json::Error> {
        let response: WikiPageResponse = serde_json::from_str(&raw)?;
        Ok(Self {
            page: response.wiki_page,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PAGE: &str = r#"{
        "wiki_page": {
            "title": "Install_Guide",
            "parent": {"title": "Wiki"},
            "text": "h1. Install\n\n!setup.png!",
            "version": 7,
            "author": {"id": 3, "name": "Dana Smith"},
            "comments": "",
            "created_on": "2019-03-01T10:00:00Z",
            "updated_on": "2021-06-12T08:30:00Z",
            "attachments": [
                {"id": 11, "filename": "setup.png", "filesize": 2048,
                 "content_type": "image/png",
                 "content_url": "https://redmine.example.com/attachments/download/11/setup.png"},
                {"id": 12, "filename": "orphan.bin"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_wiki_page() {
        let fetched = FetchedPage::parse(PAGE.to_owned()).unwrap();
        let doc = fetched.page.to_document();

        assert_eq!(doc.id, "Install_Guide");
        assert_eq!(doc.parent.as_deref(), Some("Wiki"));
        assert_eq!(doc.author.as_deref(), Some("Dana Smith"));
        assert_eq!(doc.version.as_deref(), Some("7"));
        assert_eq!(doc.comments, None);
        assert_eq!(
            doc.attachments,
            vec![AttachmentRef {
                filename: "setup.png".to_owned(),
                locator: AssetLocator::Url(
                    "https://redmine.example.com/attachments/download/11/setup.png".to_owned()
                ),
                content_type: Some("image/png".to_owned()),
            }]
        );
        assert_eq!(fetched.raw, PAGE);
    }

    #[test]
    fn test_parse_minimal_page() {
        let fetched = FetchedPage::parse(r#"{"wiki_page": {"title": "Wiki"}}"#.to_owned()).unwrap();
        let doc = fetched.page.to_document();
        assert_eq!(doc.body, "");
        assert_eq!(doc.parent, None);
        assert_eq!(doc.author, None);
    }

    #[test]
    fn test_parse_rejects_missing_wrapper() {
        assert!(FetchedPage::parse(r#"{"title": "Wiki"}"#.to_owned()).is_err());
    }
}
