//! Issue import: exported Redmine issues to Jira issues.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rayon::prelude::*;
use redmig_config::{Config, ConfigError, JiraConfig};
use redmig_markup::{ReferenceRewriter, normalize};
use redmig_sequencer::{
    AssetFile, ExistingPolicy, Fallback, PublishError, PublishReport, PublishTarget, PublishUnit,
    RetryPolicy, Sequencer, SequencerOptions, TransitionFields, TransitionTable, WorkflowTarget,
};
use redmig_source::{ExportStore, IssueBundle, IssueRecord};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::adf::{issue_description, issue_metadata, paragraphs, tree_content, truncate_chars};
use crate::error::JiraError;
use crate::fields::{IssueFields, literal_value, map_fields};
use crate::lookups::JiraLookups;

/// Jira caps summaries at 255 characters, `...` included.
const SUMMARY_LIMIT: usize = 252;

/// Field set to 100 on finished issues when the site has it.
const DONE_RATIO_FIELD: &str = "% Done";

/// Redmine statuses left out by `skip_closed`.
const CLOSED_STATUSES: [&str; 2] = ["Closed", "Rejected"];

/// Transition field values standing for the issue's users.
const ASSIGNEE_PLACEHOLDER: &str = "{assignee}";
const REPORTER_PLACEHOLDER: &str = "{reporter}";

/// One exported issue turned into a publish unit.
#[derive(Debug, Clone)]
pub struct PreparedIssue {
    pub unit: PublishUnit<IssueFields>,
    /// Jira status the issue should end in.
    pub status: String,
    /// The full description was over the size limit and was replaced by the
    /// shortened one before publishing.
    pub summarized: bool,
}

/// Issue that could not be prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFailure {
    pub issue_id: u64,
    pub error: String,
}

/// Result of [`IssueImporter::prepare`].
#[derive(Debug, Clone, Default)]
pub struct Preparation {
    pub issues: Vec<PreparedIssue>,
    pub failures: Vec<IssueFailure>,
}

/// Builds Jira issues from an export directory and publishes them.
pub struct IssueImporter<'a> {
    store: &'a ExportStore,
    jira: &'a JiraConfig,
    table: TransitionTable,
    origin: Option<String>,
    skip_closed: bool,
    issue_id: Option<u64>,
    fail_fast: bool,
    overwrite: bool,
    retry: RetryPolicy,
}

impl<'a> IssueImporter<'a> {
    pub fn new(store: &'a ExportStore, jira: &'a JiraConfig) -> Self {
        Self {
            store,
            jira,
            table: TransitionTable::new(&jira.workflow),
            origin: None,
            skip_closed: false,
            issue_id: None,
            fail_fast: false,
            overwrite: false,
            retry: RetryPolicy::default(),
        }
    }

    /// Importer set up from the `[jira]`, `[redmine]` and `[publish]` sections.
    pub fn from_config(store: &'a ExportStore, config: &'a Config) -> Result<Self, ConfigError> {
        let jira = config.require_jira()?;
        let mut importer = Self::new(store, jira)
            .fail_fast(config.publish.fail_fast)
            .overwrite(config.publish.overwrite)
            .retry(RetryPolicy::new(
                config.publish.retry_attempts,
                Duration::from_millis(config.publish.retry_backoff_ms),
            ));
        if let Some(origin) = config.origin_url() {
            importer = importer.origin_url(origin);
        }
        Ok(importer)
    }

    /// Redmine base URL; links to its issues count as related issues, like
    /// `#123` references do.
    #[must_use]
    pub fn origin_url(mut self, url: impl Into<String>) -> Self {
        self.origin = Some(url.into());
        self
    }

    /// Leave out issues that are closed or rejected in Redmine.
    #[must_use]
    pub fn skip_closed(mut self, skip: bool) -> Self {
        self.skip_closed = skip;
        self
    }

    /// Import only this issue.
    #[must_use]
    pub fn issue_id(mut self, id: Option<u64>) -> Self {
        self.issue_id = id;
        self
    }

    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Delete and recreate issues imported by an earlier run.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read the export directory and build every selected issue.
    ///
    /// Issues are built in parallel and keep id order. An issue that cannot
    /// be built is reported in [`Preparation::failures`]; an unknown Jira
    /// field aborts the whole run.
    pub fn prepare(&self, lookups: &JiraLookups<'_>) -> Result<Preparation, JiraError> {
        let id_field = lookups.field_id(&self.jira.id_field)?;
        let bundles: Vec<IssueBundle> = self
            .store
            .read_issues()?
            .into_iter()
            .filter(|b| self.selected(&b.record))
            .collect();
        info!("Preparing {} issues", bundles.len());

        let results: Vec<(u64, Result<PreparedIssue, JiraError>)> = bundles
            .par_iter()
            .map(|b| (b.record.id, self.prepare_issue(b, lookups, &id_field)))
            .collect();

        let mut preparation = Preparation::default();
        for (issue_id, result) in results {
            match result {
                Ok(issue) => preparation.issues.push(issue),
                Err(err @ JiraError::FieldNotFound(_)) => return Err(err),
                Err(err) => {
                    warn!("Cannot prepare Redmine issue #{}: {}", issue_id, err);
                    preparation.failures.push(IssueFailure {
                        issue_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(preparation)
    }

    fn selected(&self, record: &IssueRecord) -> bool {
        if self.issue_id.is_some_and(|id| id != record.id) {
            return false;
        }
        if self.skip_closed
            && record
                .status_name()
                .is_some_and(|s| CLOSED_STATUSES.contains(&s))
        {
            debug!("Skipping closed issue #{}", record.id);
            return false;
        }
        true
    }

    fn prepare_issue(
        &self,
        bundle: &IssueBundle,
        lookups: &JiraLookups<'_>,
        id_field: &str,
    ) -> Result<PreparedIssue, JiraError> {
        let record = &bundle.record;
        let jira = self.jira;

        let status = record
            .status_name()
            .and_then(|s| jira.status_map.get(s))
            .unwrap_or(&jira.default_status)
            .clone();
        let terminal = jira.is_terminal(&status);
        let priority = record
            .priority_name()
            .and_then(|p| jira.priority_map.get(p))
            .unwrap_or(&jira.default_priority);

        let mut tree = normalize(record.description_text());
        let links = ReferenceRewriter::new(self.origin.as_deref()).rewrite(&mut tree);
        let mut related = record.related_ids();
        related.extend(links.issue_references.iter().filter(|&&id| id != record.id));
        related.sort_unstable();
        related.dedup();

        let metadata = issue_metadata(record, &related);
        let full = serde_json::to_value(issue_description(
            &metadata,
            &jira.origin_notice,
            tree_content(&tree),
        ))?;
        let short = serde_json::to_value(issue_description(
            &metadata,
            &jira.origin_notice,
            paragraphs(&truncate_chars(&tree.plain_text(), jira.summary_char_limit)),
        ))?;
        let summarized = full.to_string().chars().count() > jira.content_char_limit;

        let reporter = match record.author_name() {
            Some(name) => lookups.account_id(name)?,
            None => None,
        };
        let assignee = match record.assignee_name() {
            Some(name) => lookups.account_id(name)?,
            None => None,
        };

        let mut fields = IssueFields::new();
        fields.insert("project", json!({ "key": jira.project_key }));
        fields.insert("issuetype", json!({ "name": jira.issue_type }));
        fields.insert(
            "summary",
            json!(truncate_chars(record.subject.trim(), SUMMARY_LIMIT)),
        );
        fields.insert("priority", json!({ "name": priority }));
        fields.insert(id_field, json!(record.id.to_string()));
        if let Some(account) = &reporter {
            fields.insert("reporter", json!({ "accountId": account }));
        }
        if let (Some(account), false) = (&assignee, terminal) {
            fields.insert("assignee", json!({ "accountId": account }));
        }

        let mapped = map_fields(&jira.fields, &record.custom_fields).map_err(|field| {
            JiraError::MissingField {
                issue: record.id,
                field,
            }
        })?;
        for field in mapped {
            fields.insert(lookups.field_id(&field.target)?, field.value);
        }
        if terminal {
            match lookups.optional_field_id(DONE_RATIO_FIELD)? {
                Some(done) => fields.insert(done, json!(100)),
                None => debug!("No '{}' field, not setting it", DONE_RATIO_FIELD),
            }
        }

        let attachments: Vec<AssetFile> = bundle
            .text_path
            .iter()
            .chain(&bundle.comments_path)
            .map(AssetFile::local)
            .chain(bundle.attachments.iter().map(|a| AssetFile {
                filename: a.filename.clone(),
                source: a.locator.clone(),
                content_type: a.content_type.clone(),
            }))
            .collect();

        let key = record.id.to_string();
        let mut unit = if summarized {
            warn!(
                "Redmine issue #{}: description over {} characters, using the shortened one",
                record.id, jira.content_char_limit
            );
            PublishUnit::new(key, record.subject.clone(), fields.with_description(short))
        } else {
            // The raw text files are attached either way.
            let fallback = Fallback {
                body: fields.with_description(short),
                attachments: Vec::new(),
            };
            PublishUnit::new(key, record.subject.clone(), fields.with_description(full))
                .with_fallback(fallback)
        }
        .with_attachments(attachments);

        let goal = if terminal {
            Some(status.as_str())
        } else if record.fixed_version_name() == Some(jira.backlog_version.as_str()) {
            Some(jira.backlog_status.as_str())
        } else {
            None
        };
        if let Some(goal) = goal {
            let step_fields =
                self.transition_fields(lookups, reporter.as_deref(), assignee.as_deref())?;
            unit = unit.with_workflow(self.table.plan(goal, &step_fields));
        }

        Ok(PreparedIssue {
            unit,
            status,
            summarized,
        })
    }

    /// Configured transition fields with ids resolved and user placeholders
    /// filled in. A placeholder whose user is unknown is left out.
    fn transition_fields(
        &self,
        lookups: &JiraLookups<'_>,
        reporter: Option<&str>,
        assignee: Option<&str>,
    ) -> Result<BTreeMap<String, TransitionFields>, JiraError> {
        let mut out = BTreeMap::new();
        for (status, configured) in &self.jira.transition_fields {
            let mut fields = TransitionFields::new();
            for (name, raw) in configured {
                let value = match raw.as_str() {
                    ASSIGNEE_PLACEHOLDER => assignee.map(|id| json!({ "accountId": id })),
                    REPORTER_PLACEHOLDER => reporter.map(|id| json!({ "accountId": id })),
                    _ => Some(literal_value(raw)),
                };
                if let Some(value) = value {
                    fields.insert(lookups.field_id(name)?, value);
                }
            }
            out.insert(status.clone(), fields);
        }
        Ok(out)
    }

    /// Publish prepared issues and walk their workflow plans.
    pub fn publish<T: PublishTarget<Body = IssueFields>>(
        &self,
        target: &T,
        workflow: &dyn WorkflowTarget,
        issues: &[PreparedIssue],
    ) -> Result<PublishReport, PublishError> {
        let units: Vec<PublishUnit<IssueFields>> =
            issues.iter().map(|i| i.unit.clone()).collect();
        let options = SequencerOptions {
            fail_fast: self.fail_fast,
            existing: if self.overwrite {
                ExistingPolicy::Recreate
            } else {
                ExistingPolicy::Skip
            },
            ..SequencerOptions::default()
        };

        Sequencer::new(target)
            .options(options)
            .retry(self.retry)
            .workflow(workflow)
            .publish(&units)
    }
}

/// Ids of issues that failed to prepare or to publish, sorted.
#[must_use]
pub fn failed_issue_ids(preparation: &Preparation, report: Option<&PublishReport>) -> Vec<u64> {
    let mut ids: Vec<u64> = preparation.failures.iter().map(|f| f.issue_id).collect();
    if let Some(report) = report {
        ids.extend(
            report
                .failures
                .iter()
                .filter_map(|f| f.key.parse::<u64>().ok()),
        );
    }
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Append one line per failed issue to the error log.
pub fn write_error_log(path: &Path, issue_ids: &[u64]) -> Result<(), JiraError> {
    if issue_ids.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for id in issue_ids {
        writeln!(file, "Failed to import Redmine issue #{id}")?;
    }
    info!("Wrote {} failed issue ids to {}", issue_ids.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::sync::RwLock;

    use pretty_assertions::assert_eq;
    use redmig_sequencer::{MemoLookup, MockWorkflow};
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;

    const ORIGIN: &str = "https://redmine.example.com";

    const CONFIG: &str = r#"
[jira]
base_url = "https://acme.atlassian.net"
user = "dana@example.com"
api_token = "t"
project_key = "MIG"
summary_char_limit = 20
content_char_limit = 4000

[jira.transition_fields.CLOSED]
resolution = '{"name": "Done"}'

[jira.transition_fields.ASSIGNED]
assignee = "{assignee}"
"#;

    /// In-memory Jira project keyed by Redmine id.
    #[derive(Default)]
    struct MemoryJira {
        existing: HashMap<String, String>,
        max_description: Option<usize>,
        issues: RwLock<Vec<(String, IssueFields)>>,
        uploads: RwLock<Vec<(String, String)>>,
    }

    impl PublishTarget for MemoryJira {
        type Body = IssueFields;

        fn find_existing(
            &self,
            unit: &PublishUnit<IssueFields>,
        ) -> Result<Option<String>, PublishError> {
            Ok(self.existing.get(&unit.key).cloned())
        }

        fn create(
            &self,
            _unit: &PublishUnit<IssueFields>,
            _parent_id: Option<&str>,
            body: &IssueFields,
        ) -> Result<String, PublishError> {
            if let (Some(max), Some(description)) = (self.max_description, body.get("description"))
                && description.to_string().len() > max
            {
                return Err(PublishError::from_http(400, "CONTENT_LIMIT_EXCEEDED"));
            }
            let mut issues = self.issues.write().unwrap();
            let key = format!("MIG-{}", issues.len() + 1);
            issues.push((key.clone(), body.clone()));
            Ok(key)
        }

        fn delete(&self, _remote_id: &str) -> Result<(), PublishError> {
            Ok(())
        }

        fn upload_attachment(
            &self,
            remote_id: &str,
            filename: &str,
            _data: &[u8],
            _content_type: &str,
        ) -> Result<(), PublishError> {
            self.uploads
                .write()
                .unwrap()
                .push((remote_id.to_owned(), filename.to_owned()));
            Ok(())
        }
    }

    fn load_config(temp: &TempDir, extra: &str) -> Config {
        let path = temp.path().join("redmig.toml");
        fs::write(&path, format!("{CONFIG}\n{extra}")).unwrap();
        Config::load(Some(&path), None).unwrap()
    }

    fn export(temp: &TempDir) -> ExportStore {
        let dir = temp.path().join("issues");
        fs::create_dir_all(dir.join("issue_42_attachments")).unwrap();
        fs::write(
            dir.join("issue_42.json"),
            r#"{"issue": {
                "id": 42,
                "subject": "Backup job fails",
                "description": "Nightly backup stops.\n\nSee \"the cron bug\":https://redmine.example.com/issues/7 and #9.",
                "status": {"id": 5, "name": "Closed"},
                "priority": {"id": 3, "name": "High"},
                "author": {"id": 1, "name": "Dana Smith"},
                "assigned_to": {"id": 2, "name": "Lee"},
                "custom_fields": [
                    {"id": 1, "name": "Server", "value": "db-02"},
                    {"id": 2, "name": "CC Ticket", "value": "CC-17"},
                    {"id": 3, "name": "Component", "value": ["Storage", "Cron"]}
                ],
                "relations": [{"id": 1, "issue_id": 42, "issue_to_id": 3, "relation_type": "relates"}]
            }}"#,
        )
        .unwrap();
        fs::write(dir.join("issue_42.txt"), "raw description").unwrap();
        fs::write(dir.join("issue_42_comments.txt"), "raw comments").unwrap();
        fs::write(dir.join("issue_42_attachments/trace.log"), "trace").unwrap();

        let subject = "x".repeat(300);
        fs::write(
            dir.join("issue_43.json"),
            format!(
                r#"{{"id": 43, "subject": "{subject}",
                    "status": {{"name": "New"}}, "priority": {{"name": "Someday"}},
                    "assigned_to": {{"name": "Lee"}}, "fixed_version": {{"name": "Backlog"}}}}"#
            ),
        )
        .unwrap();

        let description = "lorem ".repeat(1000);
        fs::write(
            dir.join("issue_44.json"),
            format!(
                r#"{{"id": 44, "subject": "Long one", "description": "{description}",
                    "status": {{"name": "Feedback"}}}}"#
            ),
        )
        .unwrap();

        ExportStore::new(dir)
    }

    fn lookups() -> JiraLookups<'static> {
        let fields = [
            ("Redmine ID", "customfield_10042"),
            ("Server", "customfield_10001"),
            ("External Ticket", "customfield_10002"),
            ("Git Branch / Pull Request", "customfield_10003"),
            ("% Done", "customfield_10004"),
            ("Components", "components"),
            ("resolution", "resolution"),
            ("assignee", "assignee"),
        ];
        JiraLookups::new(
            MemoLookup::new("field", |_| Ok(None)).with_entries(
                fields
                    .iter()
                    .map(|(name, id)| ((*name).to_owned(), (*id).to_owned())),
            ),
            MemoLookup::new("user", |query| {
                Ok(match query {
                    "dana@example.com" => Some("acct-dana".to_owned()),
                    "Lee" => Some("acct-lee".to_owned()),
                    _ => None,
                })
            }),
        )
        .with_user_map(HashMap::from([(
            "Dana Smith".to_owned(),
            "dana@example.com".to_owned(),
        )]))
    }

    fn description_text(fields: &IssueFields, block: usize) -> Value {
        fields.get("description").unwrap()["content"][block]["content"][0]["text"].clone()
    }

    #[test]
    fn test_prepare_closed_issue() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap()).origin_url(ORIGIN);

        let prepared = importer.prepare(&lookups()).unwrap();

        assert!(prepared.failures.is_empty());
        assert_eq!(prepared.issues.len(), 3);
        let issue = &prepared.issues[0];
        assert_eq!(issue.unit.key, "42");
        assert_eq!(issue.status, "CLOSED");
        assert!(!issue.summarized);

        let fields = &issue.unit.body;
        assert_eq!(fields.get("project"), Some(&json!({"key": "MIG"})));
        assert_eq!(fields.get("issuetype"), Some(&json!({"name": "Task"})));
        assert_eq!(fields.get("summary"), Some(&json!("Backup job fails")));
        assert_eq!(fields.get("priority"), Some(&json!({"name": "High"})));
        assert_eq!(fields.get("customfield_10042"), Some(&json!("42")));
        assert_eq!(fields.get("reporter"), Some(&json!({"accountId": "acct-dana"})));
        assert_eq!(fields.get("assignee"), None);
        assert_eq!(fields.get("customfield_10001"), Some(&json!("db-02")));
        assert_eq!(fields.get("customfield_10002"), Some(&json!("CC-17")));
        assert_eq!(fields.get("customfield_10003"), None);
        assert_eq!(
            fields.get("components"),
            Some(&json!([{"name": "Storage"}, {"name": "Cron"}]))
        );
        assert_eq!(fields.get("customfield_10004"), Some(&json!(100)));

        let description = fields.get("description").unwrap();
        assert_eq!(description["content"][0]["type"], "table");
        assert!(description.to_string().contains("#3, #7, #9"));
        assert_eq!(description_text(fields, 2), json!("Nightly backup stops."));
        assert!(
            description_text(fields, 3)
                .as_str()
                .unwrap()
                .contains("the cron bug")
        );

        let fallback = issue.unit.fallback.as_ref().unwrap();
        assert_eq!(description_text(&fallback.body, 2), json!("Nightly backup stops..."));
        assert!(fallback.attachments.is_empty());

        let files: Vec<&str> = issue
            .unit
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(files, vec!["issue_42.txt", "issue_42_comments.txt", "trace.log"]);

        let plan = issue.unit.workflow.as_ref().unwrap();
        assert_eq!(
            plan.statuses().collect::<Vec<_>>(),
            vec!["ASSIGNED", "IN PROGRESS", "IN REVIEW", "DEPLOYED", "RESOLVED", "CLOSED"]
        );
        assert_eq!(
            plan.steps[0].fields,
            TransitionFields::from([("assignee".to_owned(), json!({"accountId": "acct-lee"}))])
        );
        assert_eq!(
            plan.steps[5].fields,
            TransitionFields::from([("resolution".to_owned(), json!({"name": "Done"}))])
        );
    }

    #[test]
    fn test_prepare_backlog_issue() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap());

        let prepared = importer.prepare(&lookups()).unwrap();
        let issue = &prepared.issues[1];

        assert_eq!(issue.status, "NEW");
        let fields = &issue.unit.body;
        let summary = fields.get("summary").unwrap().as_str().unwrap();
        assert_eq!(summary.chars().count(), 255);
        assert!(summary.ends_with("..."));
        assert_eq!(fields.get("priority"), Some(&json!({"name": "Medium"})));
        assert_eq!(fields.get("assignee"), Some(&json!({"accountId": "acct-lee"})));
        assert_eq!(fields.get("customfield_10004"), None);
        assert_eq!(description_text(fields, 2), json!("No description."));

        let plan = issue.unit.workflow.as_ref().unwrap();
        assert_eq!(plan.statuses().collect::<Vec<_>>(), vec!["BACKLOG"]);
        assert!(issue.unit.attachments.is_empty());
    }

    #[test]
    fn test_oversized_description_is_summarized() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap());

        let prepared = importer.prepare(&lookups()).unwrap();
        let issue = &prepared.issues[2];

        assert!(issue.summarized);
        assert!(issue.unit.fallback.is_none());
        assert!(issue.unit.workflow.is_none());
        assert_eq!(
            description_text(&issue.unit.body, 2),
            json!("lorem lorem lorem lo...")
        );
    }

    #[test]
    fn test_issue_filters() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let jira = config.require_jira().unwrap();

        let open = IssueImporter::new(&store, jira)
            .skip_closed(true)
            .prepare(&lookups())
            .unwrap();
        let keys: Vec<&str> = open.issues.iter().map(|i| i.unit.key.as_str()).collect();
        assert_eq!(keys, vec!["43", "44"]);

        let single = IssueImporter::new(&store, jira)
            .issue_id(Some(43))
            .prepare(&lookups())
            .unwrap();
        assert_eq!(single.issues.len(), 1);
        assert_eq!(single.issues[0].unit.key, "43");
    }

    #[test]
    fn test_required_field_fails_issue() {
        let temp = TempDir::new().unwrap();
        let config = load_config(
            &temp,
            "[[jira.fields]]\nsource = [\"Team\"]\ntarget = \"Team\"\nrequired = true\n",
        );
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap());

        let prepared = importer.prepare(&lookups()).unwrap();

        assert!(prepared.issues.is_empty());
        assert_eq!(prepared.failures.len(), 3);
        assert!(prepared.failures[0].error.contains("Team"));
        assert_eq!(failed_issue_ids(&prepared, None), vec![42, 43, 44]);
    }

    #[test]
    fn test_unknown_target_field_aborts() {
        let temp = TempDir::new().unwrap();
        let config = load_config(
            &temp,
            "[[jira.fields]]\nsource = [\"Server\"]\ntarget = \"Rack\"\n",
        );
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap());

        let err = importer.prepare(&lookups()).unwrap_err();
        assert!(matches!(err, JiraError::FieldNotFound(name) if name == "Rack"));
    }

    #[test]
    fn test_publish_walks_workflow() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap())
            .issue_id(Some(42))
            .retry(RetryPolicy::none());
        let prepared = importer.prepare(&lookups()).unwrap();
        let target = MemoryJira::default();
        let workflow = MockWorkflow::linear(&[
            "NEW",
            "ASSIGNED",
            "IN PROGRESS",
            "IN REVIEW",
            "DEPLOYED",
            "RESOLVED",
            "CLOSED",
        ])
        .with_fields("ASSIGNED", &["assignee"])
        .with_fields("CLOSED", &["resolution"]);

        let report = importer
            .publish(&target, &workflow, &prepared.issues)
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.remote_id("42"), Some("MIG-1"));
        assert_eq!(report.uploads.uploaded, 3);
        assert!(report.workflows[0].log.is_complete());
        assert_eq!(workflow.status("MIG-1"), "CLOSED");

        let applied = workflow.applied_fields("MIG-1");
        assert_eq!(applied.len(), 6);
        assert_eq!(applied[0]["assignee"], json!({"accountId": "acct-lee"}));
        assert!(applied[1].is_empty());
        assert_eq!(applied[5]["resolution"], json!({"name": "Done"}));
    }

    #[test]
    fn test_content_limit_uses_fallback_description() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap())
            .issue_id(Some(42))
            .retry(RetryPolicy::none());
        let prepared = importer.prepare(&lookups()).unwrap();
        let fallback = prepared.issues[0].unit.fallback.clone().unwrap();
        let target = MemoryJira {
            max_description: Some(fallback.body.get("description").unwrap().to_string().len()),
            ..MemoryJira::default()
        };

        let report = importer
            .publish(&target, &MockWorkflow::linear(&["NEW"]), &prepared.issues)
            .unwrap();

        assert!(report.created[0].used_fallback);
        let issues = target.issues.read().unwrap();
        assert_eq!(issues[0].1, fallback.body);
        assert_eq!(target.uploads.read().unwrap().len(), 3);
    }

    #[test]
    fn test_rerun_skips_existing_issue() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp, "");
        let store = export(&temp);
        let importer = IssueImporter::new(&store, config.require_jira().unwrap())
            .issue_id(Some(42))
            .retry(RetryPolicy::none());
        let prepared = importer.prepare(&lookups()).unwrap();
        let target = MemoryJira {
            existing: HashMap::from([("42".to_owned(), "MIG-7".to_owned())]),
            ..MemoryJira::default()
        };

        let report = importer
            .publish(&target, &MockWorkflow::linear(&["NEW"]), &prepared.issues)
            .unwrap();

        assert_eq!(report.existing.len(), 1);
        assert_eq!(report.remote_id("42"), Some("MIG-7"));
        assert!(report.workflows.is_empty());
        assert!(target.issues.read().unwrap().is_empty());
    }

    #[test]
    fn test_error_log_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("errors.log");

        write_error_log(&path, &[7]).unwrap();
        write_error_log(&path, &[]).unwrap();
        write_error_log(&path, &[9, 12]).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Failed to import Redmine issue #7\n\
             Failed to import Redmine issue #9\n\
             Failed to import Redmine issue #12\n"
        );
    }

    #[test]
    fn test_from_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(
            &temp,
            "[redmine]\nbase_url = \"https://redmine.example.com/\"\nproject = \"ops\"\napi_key = \"k\"\n\n[publish]\nfail_fast = true\n",
        );
        let store = ExportStore::new(temp.path());

        let importer = IssueImporter::from_config(&store, &config).unwrap();

        assert_eq!(importer.origin.as_deref(), Some(ORIGIN));
        assert!(importer.fail_fast);
        assert!(!importer.overwrite);
    }
}
