//! Jira Cloud issue import for redmig.
//!
//! Exported Redmine issues become Jira issues whose description is an
//! Atlassian Document Format tree ([`adf`]): a metadata table, a migration
//! notice and the description text. Custom fields are mapped with a
//! configurable default-fill policy, users are resolved through a cached
//! lookup, and finished issues are walked through their workflow chain after
//! creation.
//!
//! # Example
//!
//! ```ignore
//! use redmig_jira::{IssueImporter, JiraClient, JiraLookups, JiraTarget};
//!
//! let client = JiraClient::new(&jira.base_url, &jira.user, &jira.api_token, None);
//! let lookups = JiraLookups::from_client(&client)?;
//! let importer = IssueImporter::from_config(&store, &config)?;
//! let prepared = importer.prepare(&lookups)?;
//!
//! let target = JiraTarget::new(&client, &jira.project_key, &lookups.field_id(&jira.id_field)?);
//! let report = importer.publish(&target, &target, &prepared.issues)?;
//! ```

pub mod adf;
mod client;
mod error;
mod fields;
mod importer;
mod lookups;
mod target;
mod types;

pub use client::JiraClient;
pub use error::JiraError;
pub use fields::{IssueFields, MappedField, map_fields};
pub use importer::{
    IssueFailure, IssueImporter, Preparation, PreparedIssue, failed_issue_ids, write_error_log,
};
pub use lookups::{JiraLookups, load_user_map};
pub use target::JiraTarget;
