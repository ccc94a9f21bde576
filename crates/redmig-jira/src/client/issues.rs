//! Issue operations for Jira API.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{debug, info};

use super::{JiraClient, check_status, read_json};
use crate::error::JiraError;
use crate::fields::IssueFields;
use crate::types::{CreatedIssue, FoundIssue, SearchResponse, TransitionEntry, TransitionsResponse};

impl JiraClient {
    /// Create an issue and return its id and key.
    pub fn create_issue(&self, fields: &IssueFields) -> Result<CreatedIssue, JiraError> {
        let url = format!("{}/issue", self.api_url());
        let payload = serde_json::to_vec(fields)?;

        debug!("Creating issue ({} bytes)", payload.len());

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&payload[..])?;

        let created: CreatedIssue = read_json(response)?;
        info!("Created issue {}", created.key);
        Ok(created)
    }

    /// Delete an issue and its subtasks.
    pub fn delete_issue(&self, key: &str) -> Result<(), JiraError> {
        let url = format!("{}/issue/{}", self.api_url(), key);

        info!("Deleting issue {}", key);

        let response = self
            .agent
            .delete(&url)
            .query("deleteSubtasks", "true")
            .header("Authorization", &self.auth_header)
            .call()?;

        check_status(response)
    }

    /// Issues matching `jql`, with `fields` returned for each.
    pub fn search(&self, jql: &str, fields: &[&str]) -> Result<Vec<FoundIssue>, JiraError> {
        let url = format!("{}/search/jql", self.api_url());
        let payload = serde_json::to_vec(&json!({
            "jql": jql,
            "fields": fields,
            "maxResults": 50,
        }))?;

        debug!("Searching issues: {}", jql);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&payload[..])?;

        let found: SearchResponse = read_json(response)?;
        Ok(found.issues)
    }

    /// Transitions available from the issue's current status.
    pub fn transitions(&self, key: &str) -> Result<Vec<TransitionEntry>, JiraError> {
        let url = format!("{}/issue/{}/transitions", self.api_url(), key);

        let response = self
            .agent
            .get(&url)
            .query("expand", "transitions.fields")
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()?;

        let found: TransitionsResponse = read_json(response)?;
        Ok(found.transitions)
    }

    /// Apply a transition, setting `fields` on its screen.
    pub fn transition(
        &self,
        key: &str,
        transition_id: &str,
        fields: &BTreeMap<String, Value>,
    ) -> Result<(), JiraError> {
        let url = format!("{}/issue/{}/transitions", self.api_url(), key);
        let payload = serde_json::to_vec(&transition_payload(transition_id, fields))?;

        debug!("Applying transition {} to {}", transition_id, key);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&payload[..])?;

        check_status(response)
    }
}

fn transition_payload(transition_id: &str, fields: &BTreeMap<String, Value>) -> Value {
    if fields.is_empty() {
        json!({ "transition": { "id": transition_id } })
    } else {
        json!({ "transition": { "id": transition_id }, "fields": fields })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_transition_payload() {
        assert_eq!(
            transition_payload("31", &BTreeMap::new()),
            json!({"transition": {"id": "31"}})
        );
        let fields = BTreeMap::from([("resolution".to_owned(), json!({"name": "Done"}))]);
        assert_eq!(
            transition_payload("31", &fields),
            json!({"transition": {"id": "31"}, "fields": {"resolution": {"name": "Done"}}})
        );
    }
}
