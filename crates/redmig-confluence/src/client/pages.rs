//! Space and page operations for Confluence API.

use tracing::{debug, info};

use super::{ConfluenceClient, check_status, read_json};
use crate::error::ConfluenceError;
use crate::types::{
    ContentNode, ContentProperty, CreatePageRequest, ResultsResponse, Space, StorageBody,
};

/// Property key that switches a page to full-width layout.
const APPEARANCE_KEY: &str = "content-appearance-published";

impl ConfluenceClient {
    /// Look up a space by key.
    pub fn get_space(&self, key: &str) -> Result<Space, ConfluenceError> {
        let url = format!("{}/spaces", self.api_url());

        info!("Getting space {}", key);

        let response = self
            .agent
            .get(&url)
            .query("keys", key)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()?;

        let spaces: ResultsResponse<Space> = read_json(response)?;
        spaces
            .results
            .into_iter()
            .find(|s| s.key == key)
            .ok_or_else(|| ConfluenceError::SpaceNotFound(key.to_owned()))
    }

    /// Id of the folder titled `folder` directly under the space home page.
    pub fn folder_id(&self, space: &Space, folder: &str) -> Result<String, ConfluenceError> {
        let not_found = || ConfluenceError::FolderNotFound {
            folder: folder.to_owned(),
            space: space.key.clone(),
        };
        let home = space.homepage_id.as_deref().ok_or_else(not_found)?;
        let url = format!("{}/pages/{}/descendants", self.api_url(), home);

        info!("Looking up folder '{}' under page {}", folder, home);

        let response = self
            .agent
            .get(&url)
            .query("depth", "1")
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()?;

        let children: ResultsResponse<ContentNode> = read_json(response)?;
        children
            .results
            .into_iter()
            .find(|c| c.title == folder)
            .map(|c| c.id)
            .ok_or_else(not_found)
    }

    /// Id of the current page titled `title`, if one exists.
    pub fn find_page_id(
        &self,
        space_id: &str,
        title: &str,
    ) -> Result<Option<String>, ConfluenceError> {
        let url = format!("{}/pages", self.api_url());

        debug!("Looking up page '{}'", title);

        let response = self
            .agent
            .get(&url)
            .query("space-id", space_id)
            .query("title", title)
            .query("status", "current")
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()?;

        let pages: ResultsResponse<ContentNode> = read_json(response)?;
        Ok(pages
            .results
            .into_iter()
            .find(|p| p.title == title)
            .map(|p| p.id))
    }

    /// Create a page in storage representation and return its id.
    pub fn create_page(
        &self,
        space_id: &str,
        title: &str,
        parent_id: Option<&str>,
        body: &str,
    ) -> Result<String, ConfluenceError> {
        let url = format!("{}/pages", self.api_url());

        let payload = CreatePageRequest {
            space_id,
            status: "current",
            title,
            parent_id,
            body: StorageBody {
                representation: "storage",
                value: body,
            },
        };
        let payload_bytes = serde_json::to_vec(&payload)?;

        info!("Creating page '{}' (parent={:?})", title, parent_id);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&payload_bytes[..])?;

        let page: ContentNode = read_json(response)?;
        Ok(page.id)
    }

    /// Switch a page to full-width layout.
    pub fn set_full_width(&self, page_id: &str) -> Result<(), ConfluenceError> {
        let url = format!("{}/pages/{}/properties", self.api_url(), page_id);

        let payload = ContentProperty {
            key: APPEARANCE_KEY,
            value: "full-width",
        };
        let payload_bytes = serde_json::to_vec(&payload)?;

        debug!("Setting full width on page {}", page_id);

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&payload_bytes[..])?;

        check_status(response)
    }

    /// Delete a page (moves it to the trash).
    pub fn delete_page(&self, page_id: &str) -> Result<(), ConfluenceError> {
        let url = format!("{}/pages/{}", self.api_url(), page_id);

        info!("Deleting page {}", page_id);

        let response = self
            .agent
            .delete(&url)
            .header("Authorization", &self.auth_header)
            .call()?;

        check_status(response)
    }
}
