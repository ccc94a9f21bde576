//! Jira Cloud REST API v3 client.
//!
//! Sync HTTP client with basic authentication (`user:api_token`).

mod attachments;
mod issues;
mod users;

use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::de::DeserializeOwned;
use ureq::Agent;
use ureq::http::Response;

use crate::error::JiraError;

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Jira REST API client.
pub struct JiraClient {
    agent: Agent,
    base_url: String,
    auth_header: String,
}

impl JiraClient {
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

    fn api_url(&self) -> String {
        format!("{}/rest/api/3", self.base_url)
    }
}

fn basic_auth(user: &str, api_token: &str) -> String {
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{user}:{api_token}"))
    )
}

fn error_response(status: u16, body: &mut ureq::Body) -> JiraError {
    let body = body
        .read_to_string()
        .unwrap_or_else(|_| "(unable to read error body)".to_owned());
    JiraError::HttpResponse { status, body }
}

/// Turn an error status into [`JiraError::HttpResponse`], otherwise decode
/// the JSON body.
fn read_json<T: DeserializeOwned>(response: Response<ureq::Body>) -> Result<T, JiraError> {
    let status = response.status().as_u16();
    let mut body = response.into_body();
    if status >= 400 {
        return Err(error_response(status, &mut body));
    }
    Ok(body.read_json()?)
}

fn check_status(response: Response<ureq::Body>) -> Result<(), JiraError> {
    let status = response.status().as_u16();
    if status >= 400 {
        return Err(error_response(status, &mut response.into_body()));
    }
    Ok(())
}
