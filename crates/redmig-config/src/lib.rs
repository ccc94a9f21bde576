//! Configuration management for redmig.
//!
//! Parses `redmig.toml` with serde and discovers the file in the current
//! directory or any parent. CLI flags are layered on top through
//! [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String values that carry hosts or credentials support:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `redmine.base_url`, `redmine.api_key`, `redmine.session_cookie`
//! - `confluence.base_url`, `confluence.user`, `confluence.api_token`
//! - `jira.base_url`, `jira.user`, `jira.api_token`
//! - `links.issue_search_url`

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// CLI settings that override configuration file values.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the export directory.
    pub export_dir: Option<PathBuf>,
    /// Override fail-fast mode.
    pub fail_fast: Option<bool>,
    /// Override overwrite (delete then recreate) mode.
    pub overwrite: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "redmig.toml";

/// Default placeholder for the origin issue id in search URLs.
pub const ISSUE_ID_PLACEHOLDER: &str = "{id}";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source Redmine instance.
    pub redmine: Option<RedmineConfig>,
    /// Confluence target.
    pub confluence: Option<ConfluenceConfig>,
    /// Jira target.
    pub jira: Option<JiraConfig>,
    /// Cross-document link rewriting.
    pub links: LinksConfig,
    /// Publication behavior shared by both targets.
    pub publish: PublishConfig,
    /// Export layout location (relative string from TOML).
    export: ExportConfigRaw,

    /// Resolved export directory (set after loading).
    #[serde(skip)]
    pub export_dir: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ExportConfigRaw {
    dir: Option<String>,
}

/// Redmine source configuration.
#[derive(Debug, Deserialize)]
pub struct RedmineConfig {
    /// Redmine base URL, e.g. `https://redmine.example.com`.
    pub base_url: String,
    /// Project identifier whose wiki is exported.
    pub project: String,
    /// REST API key (`X-Redmine-API-Key`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Browser session cookie used when the REST API is disabled.
    #[serde(default)]
    pub session_cookie: Option<String>,
    /// Page titles to leave out of the export.
    #[serde(default)]
    pub skip_pages: Vec<String>,
}

impl RedmineConfig {
    /// Validate that all required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or neither
    /// credential is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.base_url, "redmine.base_url")?;
        require_http_url(&self.base_url, "redmine.base_url")?;
        require_non_empty(&self.project, "redmine.project")?;
        let has_key = self.api_key.as_deref().is_some_and(|k| !k.is_empty());
        let has_cookie = self
            .session_cookie
            .as_deref()
            .is_some_and(|c| !c.is_empty());
        if !has_key && !has_cookie {
            return Err(ConfigError::Validation(
                "redmine.api_key or redmine.session_cookie must be set".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Confluence target configuration.
#[derive(Debug, Deserialize)]
pub struct ConfluenceConfig {
    /// Confluence Cloud site URL, e.g. `https://acme.atlassian.net`.
    pub base_url: String,
    /// Account email used for basic auth.
    pub user: String,
    /// API token paired with `user`.
    pub api_token: String,
    /// Target space key.
    pub space_key: String,
    /// Folder under the space home page that receives the wiki root.
    #[serde(default)]
    pub parent_folder: Option<String>,
    /// Redmine wiki start page; parentless pages are placed under it.
    #[serde(default = "default_page_root")]
    pub page_root: String,
    /// Qualifier appended to every migrated page title.
    #[serde(default = "default_title_suffix")]
    pub title_suffix: String,
    /// Publish pages with the full-width appearance.
    #[serde(default = "default_true")]
    pub full_width: bool,
}

impl ConfluenceConfig {
    /// Validate that all required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or has invalid format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.base_url, "confluence.base_url")?;
        require_http_url(&self.base_url, "confluence.base_url")?;
        require_non_empty(&self.user, "confluence.user")?;
        require_non_empty(&self.api_token, "confluence.api_token")?;
        require_non_empty(&self.space_key, "confluence.space_key")?;
        require_non_empty(&self.page_root, "confluence.page_root")?;
        Ok(())
    }
}

fn default_page_root() -> String {
    "Wiki".to_owned()
}

fn default_title_suffix() -> String {
    " (Legacy)".to_owned()
}

fn default_true() -> bool {
    true
}

/// Jira target configuration.
#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    /// Jira Cloud site URL.
    pub base_url: String,
    /// Account email used for basic auth.
    pub user: String,
    /// API token paired with `user`.
    pub api_token: String,
    /// Target project key.
    pub project_key: String,
    /// Issue type for every migrated issue.
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
    /// Name of the custom field holding the Redmine issue id.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Assembled description size above which the summary fallback is used.
    #[serde(default = "default_content_char_limit")]
    pub content_char_limit: usize,
    /// Characters of description kept by the summary fallback.
    #[serde(default = "default_summary_char_limit")]
    pub summary_char_limit: usize,
    /// Text of the migration notice panel.
    #[serde(default = "default_origin_notice")]
    pub origin_notice: String,
    /// Redmine fixed version that sends open issues to the backlog.
    #[serde(default = "default_backlog_version")]
    pub backlog_version: String,
    /// Jira status reached by the backlog transition.
    #[serde(default = "default_backlog_status")]
    pub backlog_status: String,
    /// Jira statuses that count as finished.
    #[serde(default = "default_terminal_statuses")]
    pub terminal_statuses: Vec<String>,
    /// Redmine priority name to Jira priority name.
    #[serde(default = "default_priority_map")]
    pub priority_map: BTreeMap<String, String>,
    /// Jira priority used when the Redmine priority is unmapped.
    #[serde(default = "default_priority")]
    pub default_priority: String,
    /// Redmine status name to Jira status name.
    #[serde(default = "default_status_map")]
    pub status_map: BTreeMap<String, String>,
    /// Jira status used when the Redmine status is unmapped.
    #[serde(default = "default_status")]
    pub default_status: String,
    /// Custom field mappings with their default-fill policy.
    #[serde(default = "default_field_mappings")]
    pub fields: Vec<FieldMapping>,
    /// Terminal status to the ordered chain of statuses leading to it.
    #[serde(default = "default_workflow")]
    pub workflow: BTreeMap<String, Vec<String>>,
    /// Static field values offered to the transition into a status.
    #[serde(default)]
    pub transition_fields: BTreeMap<String, BTreeMap<String, String>>,
}

impl JiraConfig {
    /// Validate that all required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or has invalid format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.base_url, "jira.base_url")?;
        require_http_url(&self.base_url, "jira.base_url")?;
        require_non_empty(&self.user, "jira.user")?;
        require_non_empty(&self.api_token, "jira.api_token")?;
        require_non_empty(&self.project_key, "jira.project_key")?;
        require_non_empty(&self.id_field, "jira.id_field")?;
        if self.summary_char_limit == 0 {
            return Err(ConfigError::Validation(
                "jira.summary_char_limit must be greater than 0".to_owned(),
            ));
        }
        if self.content_char_limit <= self.summary_char_limit {
            return Err(ConfigError::Validation(
                "jira.content_char_limit must exceed jira.summary_char_limit".to_owned(),
            ));
        }
        for (i, mapping) in self.fields.iter().enumerate() {
            if mapping.source.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "jira.fields[{i}].source cannot be empty"
                )));
            }
            require_non_empty(&mapping.target, &format!("jira.fields[{i}].target"))?;
        }
        Ok(())
    }

    /// Whether `status` (already mapped to Jira) is a finished status.
    #[must_use]
    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(status))
    }
}

/// Shape of the value a Jira field expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Plain string.
    #[default]
    Text,
    /// Single select option, sent as `{"value": ...}`.
    Option,
    /// List of named values, sent as `[{"name": ...}]`.
    Names,
    /// Number.
    Number,
}

/// Mapping from Redmine custom fields to one Jira field.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Redmine custom field names, first non-empty wins.
    pub source: Vec<String>,
    /// Jira field name (resolved to its id at import time).
    pub target: String,
    /// Value shape.
    #[serde(default)]
    pub kind: FieldKind,
    /// Value used when no source field has a value.
    #[serde(default)]
    pub default: Option<String>,
    /// Fail the issue when no value and no default is available.
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    fn new(source: &[&str], target: &str, kind: FieldKind) -> Self {
        Self {
            source: source.iter().map(|s| (*s).to_owned()).collect(),
            target: target.to_owned(),
            kind,
            default: None,
            required: false,
        }
    }
}

fn default_issue_type() -> String {
    "Task".to_owned()
}

fn default_id_field() -> String {
    "Redmine ID".to_owned()
}

fn default_content_char_limit() -> usize {
    32_000
}

fn default_summary_char_limit() -> usize {
    500
}

fn default_origin_notice() -> String {
    "Migrated from Redmine.".to_owned()
}

fn default_backlog_version() -> String {
    "Backlog".to_owned()
}

fn default_backlog_status() -> String {
    "BACKLOG".to_owned()
}

fn default_terminal_statuses() -> Vec<String> {
    vec!["REJECTED".to_owned(), "RESOLVED".to_owned(), "CLOSED".to_owned()]
}

fn default_priority() -> String {
    "Medium".to_owned()
}

fn default_status() -> String {
    "NEW".to_owned()
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn default_priority_map() -> BTreeMap<String, String> {
    string_map(&[
        ("Immediate", "Immediate"),
        ("Urgent", "Urgent"),
        ("High", "High"),
        ("Normal", "Normal"),
        ("Low", "Low"),
    ])
}

fn default_status_map() -> BTreeMap<String, String> {
    string_map(&[
        ("New", "NEW"),
        ("Assigned", "ASSIGNED"),
        ("Resolved", "RESOLVED"),
        ("Feedback", "WAITING FOR FEEDBACK"),
        ("Closed", "CLOSED"),
        ("Rejected", "REJECTED"),
    ])
}

fn default_field_mappings() -> Vec<FieldMapping> {
    vec![
        FieldMapping::new(&["Server"], "Server", FieldKind::Text),
        FieldMapping::new(&["Git Branch"], "Git Branch / Pull Request", FieldKind::Text),
        FieldMapping::new(&["Component"], "Components", FieldKind::Names),
        FieldMapping::new(
            &["Customer Ticket", "CC Ticket"],
            "External Ticket",
            FieldKind::Text,
        ),
    ]
}

fn default_workflow() -> BTreeMap<String, Vec<String>> {
    let chain = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
    let mut workflow = BTreeMap::new();
    workflow.insert(
        "RESOLVED".to_owned(),
        chain(&["ASSIGNED", "IN PROGRESS", "IN REVIEW", "DEPLOYED", "RESOLVED"]),
    );
    workflow.insert("CLOSED".to_owned(), chain(&["RESOLVED", "CLOSED"]));
    workflow.insert("REJECTED".to_owned(), chain(&["REJECTED"]));
    workflow
}

/// Link rewriting configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct LinksConfig {
    /// Search URL for migrated issues; `{id}` is replaced by the Redmine id.
    pub issue_search_url: Option<String>,
}

/// Publication behavior.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Stop the batch after the first failed unit.
    pub fail_fast: bool,
    /// Delete and recreate documents that already exist.
    pub overwrite: bool,
    /// Attempts per transient remote failure.
    pub retry_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_backoff_ms: u64,
    /// Global timeout of every HTTP call.
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            overwrite: false,
            retry_attempts: 5,
            retry_backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`jira.api_token`").
        field: String,
        /// Error message (e.g., "${`JIRA_TOKEN`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `redmig.toml` in the current directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(dir) = &settings.export_dir {
            self.export_dir.clone_from(dir);
        }
        if let Some(fail_fast) = settings.fail_fast {
            self.publish.fail_fast = fail_fast;
        }
        if let Some(overwrite) = settings.overwrite {
            self.publish.overwrite = overwrite;
        }
    }

    /// Get validated Redmine configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_redmine(&self) -> Result<&RedmineConfig, ConfigError> {
        let redmine = self.redmine.as_ref().ok_or_else(|| {
            ConfigError::Validation("[redmine] section required in config".into())
        })?;
        redmine.validate()?;
        Ok(redmine)
    }

    /// Get validated Confluence configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_confluence(&self) -> Result<&ConfluenceConfig, ConfigError> {
        let conf = self.confluence.as_ref().ok_or_else(|| {
            ConfigError::Validation("[confluence] section required in config".into())
        })?;
        conf.validate()?;
        Ok(conf)
    }

    /// Get validated Jira configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_jira(&self) -> Result<&JiraConfig, ConfigError> {
        let jira = self
            .jira
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("[jira] section required in config".into()))?;
        jira.validate()?;
        Ok(jira)
    }

    /// Origin base URL used to recognize links back into Redmine.
    #[must_use]
    pub fn origin_url(&self) -> Option<&str> {
        self.redmine
            .as_ref()
            .map(|r| r.base_url.trim_end_matches('/'))
    }

    /// Search URL template for migrated issues.
    ///
    /// Falls back to the Jira site, then the Confluence site, searching the
    /// Redmine id field.
    #[must_use]
    pub fn issue_search_url(&self) -> Option<String> {
        if let Some(url) = &self.links.issue_search_url {
            return Some(url.clone());
        }
        let site = self
            .jira
            .as_ref()
            .map(|j| j.base_url.as_str())
            .or_else(|| self.confluence.as_ref().map(|c| c.base_url.as_str()))?;
        Some(format!(
            "{}/issues/?jql=\"RedmineID:{ISSUE_ID_PLACEHOLDER}\"",
            site.trim_end_matches('/')
        ))
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            redmine: None,
            confluence: None,
            jira: None,
            links: LinksConfig::default(),
            publish: PublishConfig::default(),
            export: ExportConfigRaw::default(),
            export_dir: base.join("export"),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate values that do not depend on which command runs.
    ///
    /// Target sections are validated lazily by the `require_*` accessors so
    /// that exporting does not demand Jira credentials.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "publish.retry_attempts must be at least 1".to_owned(),
            ));
        }
        if self.publish.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "publish.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        if let Some(url) = &self.links.issue_search_url {
            require_http_url(url, "links.issue_search_url")?;
            if !url.contains(ISSUE_ID_PLACEHOLDER) {
                return Err(ConfigError::Validation(format!(
                    "links.issue_search_url must contain {ISSUE_ID_PLACEHOLDER}"
                )));
            }
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(redmine) = &mut self.redmine {
            expand::expand_in_place(&mut redmine.base_url, "redmine.base_url")?;
            expand::expand_opt(&mut redmine.api_key, "redmine.api_key")?;
            expand::expand_opt(&mut redmine.session_cookie, "redmine.session_cookie")?;
        }

        if let Some(confluence) = &mut self.confluence {
            expand::expand_in_place(&mut confluence.base_url, "confluence.base_url")?;
            expand::expand_in_place(&mut confluence.user, "confluence.user")?;
            expand::expand_in_place(&mut confluence.api_token, "confluence.api_token")?;
        }

        if let Some(jira) = &mut self.jira {
            expand::expand_in_place(&mut jira.base_url, "jira.base_url")?;
            expand::expand_in_place(&mut jira.user, "jira.user")?;
            expand::expand_in_place(&mut jira.api_token, "jira.api_token")?;
        }

        expand::expand_opt(&mut self.links.issue_search_url, "links.issue_search_url")?;

        Ok(())
    }

    fn resolve_paths(&mut self, config_dir: &Path) {
        self.export_dir = config_dir.join(self.export.dir.as_deref().unwrap_or("export"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
[redmine]
base_url = "https://redmine.example.com"
project = "ops"
api_key = "k"

[confluence]
base_url = "https://acme.atlassian.net"
user = "me@acme.com"
api_token = "t"
space_key = "OPS"
parent_folder = "Legacy Wiki"

[jira]
base_url = "https://acme.atlassian.net"
user = "me@acme.com"
api_token = "t"
project_key = "OPS"
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/work"));
        assert_eq!(config.export_dir, PathBuf::from("/work/export"));
        assert!(config.redmine.is_none());
        assert!(!config.publish.fail_fast);
        assert_eq!(config.publish.retry_attempts, 5);
        assert_eq!(config.publish.retry_backoff_ms, 500);
        assert_eq!(config.publish.timeout_secs, 30);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.confluence.is_none());
        assert!(config.jira.is_none());
        assert!(config.links.issue_search_url.is_none());
    }

    #[test]
    fn test_parse_full_config_defaults() {
        let config: Config = toml::from_str(FULL).unwrap();

        let confluence = config.confluence.as_ref().unwrap();
        assert_eq!(confluence.title_suffix, " (Legacy)");
        assert_eq!(confluence.page_root, "Wiki");
        assert!(confluence.full_width);
        assert_eq!(confluence.parent_folder.as_deref(), Some("Legacy Wiki"));

        let jira = config.jira.as_ref().unwrap();
        assert_eq!(jira.issue_type, "Task");
        assert_eq!(jira.id_field, "Redmine ID");
        assert_eq!(jira.summary_char_limit, 500);
        assert_eq!(jira.status_map["Feedback"], "WAITING FOR FEEDBACK");
        assert_eq!(jira.fields.len(), 4);
        assert_eq!(jira.fields[3].source, vec!["Customer Ticket", "CC Ticket"]);
        assert_eq!(
            jira.workflow["RESOLVED"],
            vec!["ASSIGNED", "IN PROGRESS", "IN REVIEW", "DEPLOYED", "RESOLVED"]
        );
        assert!(jira.is_terminal("closed"));
        assert!(!jira.is_terminal("NEW"));
    }

    #[test]
    fn test_parse_field_mapping_policy() {
        let toml = r#"
[jira]
base_url = "https://acme.atlassian.net"
user = "u"
api_token = "t"
project_key = "OPS"

[[jira.fields]]
source = ["Severity"]
target = "Severity"
kind = "option"
default = "Minor"

[[jira.fields]]
source = ["Team"]
target = "Team"
required = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let jira = config.jira.unwrap();
        assert_eq!(jira.fields.len(), 2);
        assert_eq!(jira.fields[0].kind, FieldKind::Option);
        assert_eq!(jira.fields[0].default.as_deref(), Some("Minor"));
        assert!(!jira.fields[0].required);
        assert!(jira.fields[1].required);
        assert_eq!(jira.fields[1].kind, FieldKind::Text);
    }

    #[test]
    fn test_resolve_export_dir() {
        let mut config: Config = toml::from_str("[export]\ndir = \"dump\"\n").unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.export_dir, PathBuf::from("/project/dump"));
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/work"));
        config.apply_cli_settings(&CliSettings {
            export_dir: Some(PathBuf::from("/tmp/wiki")),
            fail_fast: Some(true),
            ..Default::default()
        });
        assert_eq!(config.export_dir, PathBuf::from("/tmp/wiki"));
        assert!(config.publish.fail_fast);
        assert!(!config.publish.overwrite);
    }

    #[test]
    fn test_apply_cli_settings_empty() {
        let mut config = Config::default_with_base(Path::new("/work"));
        config.apply_cli_settings(&CliSettings::default());
        assert_eq!(config.export_dir, PathBuf::from("/work/export"));
        assert!(!config.publish.fail_fast);
    }

    #[test]
    fn test_expand_env_vars_jira_token() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("REDMIG_TEST_JIRA_TOKEN", "from-env");
        }
        let toml = r#"
[jira]
base_url = "https://acme.atlassian.net"
user = "me@acme.com"
api_token = "${REDMIG_TEST_JIRA_TOKEN}"
project_key = "OPS"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();
        assert_eq!(config.jira.unwrap().api_token, "from-env");
        unsafe {
            std::env::remove_var("REDMIG_TEST_JIRA_TOKEN");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_required_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("REDMIG_TEST_MISSING");
        }
        let toml = r#"
[redmine]
base_url = "${REDMIG_TEST_MISSING}"
project = "ops"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        let err = config.expand_env_vars().unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert!(err.to_string().contains("redmine.base_url"));
    }

    #[test]
    fn test_redmine_requires_credential() {
        let toml = r#"
[redmine]
base_url = "https://redmine.example.com"
project = "ops"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.require_redmine().unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_redmine_cookie_is_enough() {
        let toml = r#"
[redmine]
base_url = "https://redmine.example.com"
project = "ops"
session_cookie = "abc"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.require_redmine().is_ok());
    }

    #[test]
    fn test_require_confluence_missing_section() {
        let config = Config::default_with_base(Path::new("/work"));
        let err = config.require_confluence().unwrap_err();
        assert!(err.to_string().contains("[confluence]"));
    }

    #[test]
    fn test_require_confluence_invalid_url() {
        let toml = r#"
[confluence]
base_url = "acme.atlassian.net"
user = "me@acme.com"
api_token = "t"
space_key = "OPS"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.require_confluence().unwrap_err();
        assert!(err.to_string().contains("confluence.base_url"));
    }

    #[test]
    fn test_require_jira_rejects_inverted_limits() {
        let toml = format!("{FULL}content_char_limit = 100\nsummary_char_limit = 500\n");
        let config: Config = toml::from_str(&toml).unwrap();
        let err = config.require_jira().unwrap_err();
        assert!(err.to_string().contains("content_char_limit"));
    }

    #[test]
    fn test_issue_search_url_defaults_to_jira_site() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(
            config.issue_search_url().as_deref(),
            Some("https://acme.atlassian.net/issues/?jql=\"RedmineID:{id}\"")
        );
    }

    #[test]
    fn test_issue_search_url_requires_placeholder() {
        let config: Config =
            toml::from_str("[links]\nissue_search_url = \"https://x.example.com/search\"\n")
                .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{id}"));
    }

    #[test]
    fn test_validate_retry_attempts_zero() {
        let config: Config = toml::from_str("[publish]\nretry_attempts = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/redmig.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file_resolves_relative_export_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redmig.toml");
        std::fs::write(&path, "[export]\ndir = \"out\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.export_dir, dir.path().join("out"));
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }
}
