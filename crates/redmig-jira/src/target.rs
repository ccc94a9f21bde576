//! Jira as a publication and workflow target.

use std::collections::BTreeMap;

use redmig_sequencer::{PublishError, PublishTarget, PublishUnit, Transition, WorkflowTarget};
use serde_json::Value;
use tracing::debug;

use crate::client::JiraClient;
use crate::fields::IssueFields;
use crate::types::{FoundIssue, TransitionEntry};

/// Creates issues in one project.
///
/// Units are keyed by Redmine issue id, which is stored in the id field and
/// searched to find issues imported by an earlier run. Remote ids are issue
/// keys.
pub struct JiraTarget<'a> {
    client: &'a JiraClient,
    project_key: String,
    id_field: String,
}

impl<'a> JiraTarget<'a> {
    /// `id_field` is the field id (e.g. `customfield_10042`) of the Redmine id.
    pub fn new(client: &'a JiraClient, project_key: &str, id_field: &str) -> Self {
        Self {
            client,
            project_key: project_key.to_owned(),
            id_field: id_field.to_owned(),
        }
    }

    fn jql(&self, redmine_id: &str) -> String {
        id_search_jql(&self.project_key, &self.id_field, redmine_id)
    }
}

/// JQL matching issues whose id field contains `redmine_id`.
fn id_search_jql(project_key: &str, id_field: &str, redmine_id: &str) -> String {
    let field = id_field
        .strip_prefix("customfield_")
        .map_or_else(|| format!("\"{id_field}\""), |n| format!("cf[{n}]"));
    let value = redmine_id.replace('"', "\\\"");
    format!("project = \"{project_key}\" AND {field} ~ \"{value}\"")
}

/// Key of the first search hit whose id field is exactly `redmine_id`.
///
/// Text search also matches partial tokens, so hits are checked again.
fn exact_match(found: Vec<FoundIssue>, id_field: &str, redmine_id: &str) -> Option<String> {
    found
        .into_iter()
        .find(|issue| match issue.fields.get(id_field) {
            Some(Value::String(s)) => s.trim() == redmine_id,
            Some(Value::Number(n)) => n.to_string() == redmine_id,
            _ => false,
        })
        .map(|issue| issue.key)
}

impl PublishTarget for JiraTarget<'_> {
    type Body = IssueFields;

    fn find_existing(&self, unit: &PublishUnit<IssueFields>) -> Result<Option<String>, PublishError> {
        let found = self.client.search(&self.jql(&unit.key), &[&self.id_field])?;
        debug!("{} candidates for Redmine issue #{}", found.len(), unit.key);
        Ok(exact_match(found, &self.id_field, &unit.key))
    }

    fn create(
        &self,
        _unit: &PublishUnit<IssueFields>,
        _parent_id: Option<&str>,
        body: &IssueFields,
    ) -> Result<String, PublishError> {
        Ok(self.client.create_issue(body)?.key)
    }

    fn delete(&self, remote_id: &str) -> Result<(), PublishError> {
        Ok(self.client.delete_issue(remote_id)?)
    }

    fn upload_attachment(
        &self,
        remote_id: &str,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), PublishError> {
        Ok(self
            .client
            .add_attachment(remote_id, filename, data, content_type)?)
    }
}

impl From<TransitionEntry> for Transition {
    fn from(entry: TransitionEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            to_status: entry.to.name,
            fields: entry.fields.into_keys().collect(),
        }
    }
}

impl WorkflowTarget for JiraTarget<'_> {
    fn available_transitions(&self, remote_id: &str) -> Result<Vec<Transition>, PublishError> {
        Ok(self
            .client
            .transitions(remote_id)?
            .into_iter()
            .map(Transition::from)
            .collect())
    }

    fn apply_transition(
        &self,
        remote_id: &str,
        transition: &Transition,
        fields: &BTreeMap<String, Value>,
    ) -> Result<(), PublishError> {
        Ok(self.client.transition(remote_id, &transition.id, fields)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::types::StatusRef;

    fn found(key: &str, value: Value) -> FoundIssue {
        FoundIssue {
            key: key.to_owned(),
            fields: BTreeMap::from([("customfield_10042".to_owned(), value)]),
        }
    }

    #[test]
    fn test_id_search_jql() {
        assert_eq!(
            id_search_jql("MIG", "customfield_10042", "42"),
            "project = \"MIG\" AND cf[10042] ~ \"42\""
        );
        assert_eq!(
            id_search_jql("MIG", "labels", "42"),
            "project = \"MIG\" AND \"labels\" ~ \"42\""
        );
    }

    #[test]
    fn test_exact_match_ignores_partial_hits() {
        let hits = vec![
            found("MIG-1", json!("142")),
            found("MIG-2", json!(42)),
            found("MIG-3", json!("42")),
        ];
        assert_eq!(
            exact_match(hits, "customfield_10042", "42").as_deref(),
            Some("MIG-2")
        );
        assert_eq!(
            exact_match(vec![found("MIG-1", json!("142"))], "customfield_10042", "42"),
            None
        );
    }

    #[test]
    fn test_transition_from_entry() {
        let transition = Transition::from(TransitionEntry {
            id: "31".to_owned(),
            name: "Close".to_owned(),
            to: StatusRef {
                name: "Closed".to_owned(),
            },
            fields: BTreeMap::from([("resolution".to_owned(), json!({"required": true}))]),
        });
        assert_eq!(transition.to_status, "Closed");
        assert_eq!(transition.fields, vec!["resolution".to_owned()]);
        assert!(transition.reaches("CLOSED"));
    }
}
