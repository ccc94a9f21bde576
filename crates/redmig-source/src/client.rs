//! Redmine HTTP client.

use std::sync::LazyLock;
use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use redmig_sequencer::{AssetFetcher, PublishError};
use regex::Regex;
use tracing::{debug, info, warn};
use ureq::Agent;

use crate::document::{FetchedPage, WikiIndexResponse};
use crate::error::SourceError;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Largest download accepted for one attachment.
const MAX_DOWNLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// Characters escaped in a page title path segment.
const TITLE_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Wiki actions that appear as links on the index page but are not pages.
const WIKI_ACTIONS: &[&str] = &["index", "date_index", "export"];

static SAFE_TITLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/?#]+$").expect("invalid title regex"));

/// Where wiki content comes from.
pub trait WikiSource {
    /// Titles of every wiki page in the project.
    fn list_pages(&self) -> Result<Vec<String>, SourceError>;

    fn fetch_page(&self, title: &str) -> Result<FetchedPage, SourceError>;

    /// Download an attachment or embedded image.
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// Redmine credentials, sent as a header on every request.
#[derive(Clone)]
pub enum RedmineAuth {
    /// REST API key (`X-Redmine-API-Key`).
    ApiKey(String),
    /// Browser session cookie (`_redmine_session`).
    Session(String),
}

impl RedmineAuth {
    /// Pick the session cookie when present, the API key otherwise.
    pub fn from_parts(api_key: Option<&str>, session_cookie: Option<&str>) -> Option<Self> {
        let present = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_owned);
        present(session_cookie)
            .map(Self::Session)
            .or_else(|| present(api_key).map(Self::ApiKey))
    }

    fn header(&self) -> (&'static str, String) {
        match self {
            Self::ApiKey(key) => ("X-Redmine-API-Key", key.clone()),
            Self::Session(cookie) => ("Cookie", format!("_redmine_session={cookie}")),
        }
    }
}

impl std::fmt::Debug for RedmineAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(***)"),
            Self::Session(_) => f.write_str("Session(***)"),
        }
    }
}

/// Redmine wiki client.
pub struct RedmineClient {
    base_url: String,
    project: String,
    auth: RedmineAuth,
    agent: Agent,
}

impl RedmineClient {
    /// Create a new Redmine client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Redmine URL (e.g., `https://redmine.example.com`)
    /// * `project` - Project identifier
    /// * `auth` - API key or session cookie
    /// * `timeout` - Per-request timeout, default 30 s
    #[must_use]
    pub fn new(
        base_url: &str,
        project: &str,
        auth: RedmineAuth,
        timeout: Option<Duration>,
    ) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(
                timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT)),
            ))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            project: project.to_owned(),
            auth,
            agent,
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn wiki_url(&self) -> String {
        format!("{}/projects/{}/wiki", self.base_url, self.project)
    }

    /// GET a URL, returning the body as text.
    fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let (name, value) = self.auth.header();
        let response = self.agent.get(url).header(name, &value).call()?;

        let status = response.status().as_u16();
        let mut body_reader = response.into_body();

        if status >= 400 {
            let error_body = body_reader
                .read_to_string()
                .unwrap_or_else(|_| "(unable to read error body)".to_owned());
            return Err(SourceError::HttpResponse {
                status,
                body: error_body,
            });
        }

        Ok(body_reader.read_to_string()?)
    }

    fn list_pages_from_api(&self) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/index.json", self.wiki_url());
        info!("Fetching wiki page list from {}", url);
        let body = self.get_text(&url)?;
        let index: WikiIndexResponse = serde_json::from_str(&body)?;
        Ok(index.wiki_pages.into_iter().map(|p| p.title).collect())
    }

    fn list_pages_from_html(&self) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/index", self.wiki_url());
        info!("Scraping wiki page list from {}", url);
        let body = self.get_text(&url)?;
        Ok(scrape_index(&body, &self.project))
    }
}

impl WikiSource for RedmineClient {
    /// Titles from `index.json`, or scraped from the HTML index when the
    /// JSON endpoint fails.
    fn list_pages(&self) -> Result<Vec<String>, SourceError> {
        match self.list_pages_from_api() {
            Ok(titles) => Ok(titles),
            Err(e) => {
                warn!("Wiki index API unavailable ({}), falling back to HTML", e);
                self.list_pages_from_html()
            }
        }
    }

    fn fetch_page(&self, title: &str) -> Result<FetchedPage, SourceError> {
        let url = format!(
            "{}/{}.json?include=attachments",
            self.wiki_url(),
            utf8_percent_encode(title, TITLE_SEGMENT)
        );
        debug!("Fetching wiki page '{}'", title);
        let raw = self.get_text(&url)?;
        Ok(FetchedPage::parse(raw)?)
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let (name, value) = self.auth.header();
        let response = self.agent.get(url).header(name, &value).call()?;

        let status = response.status().as_u16();
        let mut body_reader = response.into_body();

        if status >= 400 {
            let error_body = body_reader
                .read_to_string()
                .unwrap_or_else(|_| "(unable to read error body)".to_owned());
            return Err(SourceError::HttpResponse {
                status,
                body: error_body,
            });
        }

        Ok(body_reader
            .with_config()
            .limit(MAX_DOWNLOAD_BYTES)
            .read_to_vec()?)
    }
}

impl AssetFetcher for RedmineClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError> {
        Ok(self.fetch_bytes(url)?)
    }
}

/// Extract page titles from the HTML wiki index.
///
/// Titles are percent-decoded and de-duplicated in first-seen order; links
/// to wiki actions and sub-resources (`Page/history`) are skipped.
pub fn scrape_index(html: &str, project: &str) -> Vec<String> {
    let pattern = format!(r#"/projects/{}/wiki/([^"'>]+)""#, regex::escape(project));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mut titles: Vec<String> = Vec::new();
    for caps in re.captures_iter(html) {
        let title = percent_decode_str(&caps[1]).decode_utf8_lossy().into_owned();
        if !SAFE_TITLE_CHARS.is_match(&title) || WIKI_ACTIONS.contains(&title.as_str()) {
            continue;
        }
        if !titles.contains(&title) {
            titles.push(title);
        }
    }
    titles
}
