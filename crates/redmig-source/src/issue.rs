//! Redmine issue records as stored in an issue export directory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use redmig_markup::AttachmentRef;
use serde::Deserialize;
use serde_json::Value;

use crate::document::{NamedRef, SourceDocument};

/// Custom field values by name.
///
/// Redmine returns custom fields as a list of `{id, name, value}` objects;
/// hand-edited exports sometimes flatten them into a `{name: value}` map.
/// Both shapes are accepted. Multi-value fields are joined with `", "`.
/// Fields with an empty value are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawCustomFields")]
pub struct CustomFields(BTreeMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCustomFields {
    List(Vec<CustomFieldEntry>),
    Map(BTreeMap<String, Value>),
}

#[derive(Deserialize)]
struct CustomFieldEntry {
    name: String,
    #[serde(default)]
    value: Value,
}

impl From<RawCustomFields> for CustomFields {
    fn from(raw: RawCustomFields) -> Self {
        let pairs: Vec<(String, Value)> = match raw {
            RawCustomFields::List(entries) => {
                entries.into_iter().map(|e| (e.name, e.value)).collect()
            }
            RawCustomFields::Map(map) => map.into_iter().collect(),
        };
        Self(
            pairs
                .into_iter()
                .filter_map(|(name, value)| {
                    let text = value_text(&value);
                    (!text.is_empty()).then_some((name, text))
                })
                .collect(),
        )
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_owned(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

impl CustomFields {
    /// Non-empty value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Relation between two Redmine issues.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueRelation {
    pub issue_id: u64,
    pub issue_to_id: u64,
    #[serde(default)]
    pub relation_type: String,
}

/// Redmine issue, as in `GET /issues/{id}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRecord {
    pub id: u64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project: Option<NamedRef>,
    #[serde(default)]
    pub tracker: Option<NamedRef>,
    #[serde(default)]
    pub status: Option<NamedRef>,
    #[serde(default)]
    pub priority: Option<NamedRef>,
    #[serde(default)]
    pub author: Option<NamedRef>,
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    #[serde(default)]
    pub fixed_version: Option<NamedRef>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub updated_on: Option<String>,
    #[serde(default)]
    pub closed_on: Option<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
    #[serde(default)]
    pub relations: Vec<IssueRelation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IssueFile {
    Wrapped { issue: IssueRecord },
    Bare(IssueRecord),
}

fn name_of(r: Option<&NamedRef>) -> Option<&str> {
    r.map(|r| r.name.as_str()).filter(|n| !n.is_empty())
}

impl IssueRecord {
    /// Parse either a bare issue object or the API's `{"issue": {...}}` wrapper.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_str(json)? {
            IssueFile::Wrapped { issue } | IssueFile::Bare(issue) => issue,
        })
    }

    pub fn status_name(&self) -> Option<&str> {
        name_of(self.status.as_ref())
    }

    pub fn priority_name(&self) -> Option<&str> {
        name_of(self.priority.as_ref())
    }

    pub fn tracker_name(&self) -> Option<&str> {
        name_of(self.tracker.as_ref())
    }

    pub fn author_name(&self) -> Option<&str> {
        name_of(self.author.as_ref())
    }

    pub fn assignee_name(&self) -> Option<&str> {
        name_of(self.assigned_to.as_ref())
    }

    pub fn fixed_version_name(&self) -> Option<&str> {
        name_of(self.fixed_version.as_ref())
    }

    /// Description with surrounding whitespace removed; empty when absent.
    pub fn description_text(&self) -> &str {
        self.description.as_deref().map_or("", str::trim)
    }

    /// Ids of the other side of every relation, sorted and de-duplicated.
    pub fn related_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .relations
            .iter()
            .map(|r| {
                if r.issue_id == self.id {
                    r.issue_to_id
                } else {
                    r.issue_id
                }
            })
            .filter(|&id| id != self.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// One issue of an issue export directory with its side files.
#[derive(Debug, Clone)]
pub struct IssueBundle {
    pub record: IssueRecord,
    /// `issue_{id}.json`.
    pub json_path: PathBuf,
    /// `issue_{id}.txt`, when present.
    pub text_path: Option<PathBuf>,
    /// `issue_{id}_comments.txt`, when present.
    pub comments_path: Option<PathBuf>,
    /// Files of `issue_{id}_attachments/`.
    pub attachments: Vec<AttachmentRef>,
}

impl IssueBundle {
    /// Source document view of the issue.
    pub fn to_document(&self) -> SourceDocument {
        let r = &self.record;
        SourceDocument {
            id: r.id.to_string(),
            title: r.subject.clone(),
            body: r.description_text().to_owned(),
            author: r.author_name().map(str::to_owned),
            created_on: r.created_on.clone(),
            updated_on: r.updated_on.clone(),
            version: r.fixed_version_name().map(str::to_owned),
            parent: None,
            comments: None,
            attachments: self.attachments.clone(),
            fields: r
                .custom_fields
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        }
    }
}
