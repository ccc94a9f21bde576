//! Confluence Cloud REST API client.
//!
//! Sync HTTP client for the v2 page API and the v1 attachment API with
//! basic authentication (`user:api_token`).

mod attachments;
mod pages;

use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::de::DeserializeOwned;
use ureq::Agent;
use ureq::http::Response;

use crate::error::ConfluenceError;

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Confluence REST API client.
pub struct ConfluenceClient {
    agent: Agent,
    base_url: String,
    auth_header: String,
}

impl ConfluenceClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `base_url` - Site URL (e.g., `https://example.atlassian.net`)
    /// * `user` - Account email
    /// * `api_token` - API token of that account
    /// * `timeout` - Per-request timeout, default 30 s
    #[must_use]
    pub fn new(base_url: &str, user: &str, api_token: &str, timeout: Option<Duration>) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(
                timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT)),
            ))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth_header: basic_auth(user, api_token),
        }
    }

    /// Get the site base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL of the v2 API.
    fn api_url(&self) -> String {
        format!("{}/wiki/api/v2", self.base_url)
    }

    /// Base URL of the v1 API, still needed for attachments.
    fn rest_url(&self) -> String {
        format!("{}/wiki/rest/api", self.base_url)
    }
}

fn basic_auth(user: &str, api_token: &str) -> String {
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{user}:{api_token}"))
    )
}

/// Turn an error status into [`ConfluenceError::HttpResponse`], otherwise
/// decode the JSON body.
fn read_json<T: DeserializeOwned>(response: Response<ureq::Body>) -> Result<T, ConfluenceError> {
    let status = response.status().as_u16();
    let mut body_reader = response.into_body();

    if status >= 400 {
        let error_body = body_reader
            .read_to_string()
            .unwrap_or_else(|_| "(unable to read error body)".to_owned());
        return Err(ConfluenceError::HttpResponse {
            status,
            body: error_body,
        });
    }

    Ok(body_reader.read_json()?)
}

/// Like [`read_json`] for calls whose response body is not needed.
fn check_status(response: Response<ureq::Body>) -> Result<(), ConfluenceError> {
    let status = response.status().as_u16();
    if status >= 400 {
        let error_body = response
            .into_body()
            .read_to_string()
            .unwrap_or_else(|_| "(unable to read error body)".to_owned());
        return Err(ConfluenceError::HttpResponse {
            status,
            body: error_body,
        });
    }
    Ok(())
}
