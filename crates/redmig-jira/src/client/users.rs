//! User and field lookups for Jira API.

use tracing::debug;

use super::{JiraClient, read_json};
use crate::error::JiraError;
use crate::types::{FieldEntry, UserEntry};

impl JiraClient {
    /// Account id of the first user matching `query` (email or name).
    pub fn find_account_id(&self, query: &str) -> Result<Option<String>, JiraError> {
        let url = format!("{}/user/search", self.api_url());

        debug!("Looking up user '{}'", query);

        let response = self
            .agent
            .get(&url)
            .query("query", query)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()?;

        let users: Vec<UserEntry> = read_json(response)?;
        Ok(users.into_iter().find_map(|u| u.account_id))
    }

    /// All system and custom fields of the site.
    pub fn fields(&self) -> Result<Vec<FieldEntry>, JiraError> {
        let url = format!("{}/field", self.api_url());

        let response = self
            .agent
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()?;

        read_json(response)
    }
}
