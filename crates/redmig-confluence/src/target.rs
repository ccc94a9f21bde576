//! Confluence as a publish target.

use redmig_markup::TitleTransform;
use redmig_sequencer::{PublishError, PublishTarget, PublishUnit};
use tracing::warn;

use crate::client::ConfluenceClient;

/// Pages of one space, created through [`ConfluenceClient`].
pub struct ConfluenceTarget<'a> {
    client: &'a ConfluenceClient,
    space_id: String,
    titles: TitleTransform,
    full_width: bool,
}

impl<'a> ConfluenceTarget<'a> {
    /// Target for the space with id `space_id`.
    ///
    /// `titles` maps parent titles that are not part of a run to the titles
    /// they were published under.
    pub fn new(client: &'a ConfluenceClient, space_id: impl Into<String>, titles: TitleTransform) -> Self {
        Self {
            client,
            space_id: space_id.into(),
            titles,
            full_width: true,
        }
    }

    #[must_use]
    pub fn full_width(mut self, full_width: bool) -> Self {
        self.full_width = full_width;
        self
    }
}

impl PublishTarget for ConfluenceTarget<'_> {
    type Body = String;

    fn find_existing(&self, unit: &PublishUnit<String>) -> Result<Option<String>, PublishError> {
        Ok(self.client.find_page_id(&self.space_id, &unit.title)?)
    }

    fn create(
        &self,
        unit: &PublishUnit<String>,
        parent_id: Option<&str>,
        body: &String,
    ) -> Result<String, PublishError> {
        let id = self
            .client
            .create_page(&self.space_id, &unit.title, parent_id, body)?;
        if self.full_width
            && let Err(e) = self.client.set_full_width(&id)
        {
            warn!("Failed to set full width on '{}': {}", unit.title, e);
        }
        Ok(id)
    }

    fn delete(&self, remote_id: &str) -> Result<(), PublishError> {
        Ok(self.client.delete_page(remote_id)?)
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
            .upload_attachment(remote_id, filename, data, content_type)?)
    }

    fn resolve_parent(&self, parent_key: &str) -> Result<Option<String>, PublishError> {
        let title = self.titles.title_for(parent_key);
        Ok(self.client.find_page_id(&self.space_id, &title)?)
    }
}
