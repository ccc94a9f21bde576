//! Jira Cloud REST API v3 payloads.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Response of `POST /rest/api/3/issue`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
}

/// Issue found by a JQL search.
#[derive(Debug, Clone, Deserialize)]
pub struct FoundIssue {
    pub key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<FoundIssue>,
}

/// Status a transition leads to.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusRef {
    pub name: String,
}

/// Transition from `GET /rest/api/3/issue/{key}/transitions`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionEntry {
    pub id: String,
    pub name: String,
    pub to: StatusRef,
    /// Screen fields, present with `expand=transitions.fields`.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionsResponse {
    #[serde(default)]
    pub transitions: Vec<TransitionEntry>,
}

/// User from `GET /rest/api/3/user/search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Field from `GET /rest/api/3/field`.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldEntry {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_transitions_parse_with_fields() {
        let response: TransitionsResponse = serde_json::from_str(
            r#"{"expand": "transitions", "transitions": [
                {"id": "21", "name": "Start", "to": {"id": "3", "name": "In Progress"},
                 "fields": {"assignee": {"required": false}}},
                {"id": "31", "name": "Done", "to": {"name": "Resolved"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(response.transitions.len(), 2);
        assert_eq!(response.transitions[0].to.name, "In Progress");
        assert!(response.transitions[0].fields.contains_key("assignee"));
        assert!(response.transitions[1].fields.is_empty());
    }

    #[test]
    fn test_user_without_account_id() {
        let users: Vec<UserEntry> =
            serde_json::from_str(r#"[{"displayName": "App"}, {"accountId": "5b10"}]"#).unwrap();
        assert_eq!(users[0].account_id, None);
        assert_eq!(users[1].account_id.as_deref(), Some("5b10"));
    }
}
