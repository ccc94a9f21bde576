//! Cached field and user lookups.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use redmig_sequencer::{MemoLookup, PublishError};
use tracing::{info, warn};

use crate::client::JiraClient;
use crate::error::JiraError;

/// Field ids and user account ids needed while building issues.
///
/// Redmine user names go through the user map first; whatever comes out
/// (an email, or the name itself) is searched in Jira once and cached.
#[derive(Debug)]
pub struct JiraLookups<'a> {
    fields: MemoLookup<'a>,
    users: MemoLookup<'a>,
    user_map: HashMap<String, String>,
}

impl<'a> JiraLookups<'a> {
    pub fn new(fields: MemoLookup<'a>, users: MemoLookup<'a>) -> Self {
        Self {
            fields,
            users,
            user_map: HashMap::new(),
        }
    }

    /// Lookups backed by the site's field list and user search.
    ///
    /// Fields are listed once; both names and ids resolve to the id.
    pub fn from_client(client: &'a JiraClient) -> Result<Self, JiraError> {
        let fields = client.fields()?;
        info!("Loaded {} Jira fields", fields.len());
        let entries: Vec<(String, String)> = fields
            .into_iter()
            .flat_map(|f| [(f.name, f.id.clone()), (f.id.clone(), f.id)])
            .collect();

        Ok(Self::new(
            MemoLookup::new("field", |_| Ok(None)).with_entries(entries),
            MemoLookup::new("user", move |query| {
                client.find_account_id(query).map_err(PublishError::from)
            }),
        ))
    }

    /// Redmine user name to Jira email.
    #[must_use]
    pub fn with_user_map(mut self, map: HashMap<String, String>) -> Self {
        self.user_map = map;
        self
    }

    /// Id of the field called `name`.
    pub fn field_id(&self, name: &str) -> Result<String, JiraError> {
        self.fields
            .get(name)?
            .ok_or_else(|| JiraError::FieldNotFound(name.to_owned()))
    }

    /// Id of the field called `name`, or `None` when the site has no such field.
    pub fn optional_field_id(&self, name: &str) -> Result<Option<String>, JiraError> {
        Ok(self.fields.get(name)?)
    }

    /// Account id of a Redmine user.
    pub fn account_id(&self, redmine_user: &str) -> Result<Option<String>, JiraError> {
        let query = self
            .user_map
            .get(redmine_user)
            .map_or(redmine_user, String::as_str);
        let found = self.users.get(query)?;
        if found.is_none() {
            warn!("No Jira user for '{}'", redmine_user);
        }
        Ok(found)
    }
}

/// Read a `redmine_user,jira_email` CSV.
///
/// Blank lines, `#` comments and a `redmine_user,...` header are skipped.
pub fn load_user_map(path: &Path) -> Result<HashMap<String, String>, JiraError> {
    let text = fs::read_to_string(path)?;
    Ok(parse_user_map(&text))
}

fn parse_user_map(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (user, email) = line.split_once(',')?;
            let (user, email) = (user.trim().trim_matches('"'), email.trim().trim_matches('"'));
            if user.is_empty() || email.is_empty() || user.eq_ignore_ascii_case("redmine_user") {
                return None;
            }
            Some((user.to_owned(), email.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_user_map() {
        let map = parse_user_map(
            "redmine_user,jira_email\n\
             # contractors\n\
             \n\
             Dana Smith, dana@example.com\n\
             \"Lee\",\"lee@example.com\"\n\
             broken line\n",
        );
        assert_eq!(map.len(), 2);
        assert_eq!(map["Dana Smith"], "dana@example.com");
        assert_eq!(map["Lee"], "lee@example.com");
    }

    #[test]
    fn test_load_user_map_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("emails.csv");
        fs::write(&path, "Dana,dana@example.com\n").unwrap();
        assert_eq!(load_user_map(&path).unwrap()["Dana"], "dana@example.com");
    }

    #[test]
    fn test_user_map_applied_before_search() {
        let calls = AtomicUsize::new(0);
        let lookups = JiraLookups::new(
            MemoLookup::new("field", |_| Ok(None)),
            MemoLookup::new("user", |query| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((query == "dana@example.com").then(|| "acct-1".to_owned()))
            }),
        )
        .with_user_map(HashMap::from([(
            "Dana Smith".to_owned(),
            "dana@example.com".to_owned(),
        )]));

        assert_eq!(
            lookups.account_id("Dana Smith").unwrap().as_deref(),
            Some("acct-1")
        );
        assert_eq!(
            lookups.account_id("Dana Smith").unwrap().as_deref(),
            Some("acct-1")
        );
        assert_eq!(lookups.account_id("Nobody").unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let lookups = JiraLookups::new(
            MemoLookup::new("field", |_| Ok(None))
                .with_entries([("Server".to_owned(), "customfield_10001".to_owned())]),
            MemoLookup::new("user", |_| Ok(None)),
        );
        assert_eq!(lookups.field_id("Server").unwrap(), "customfield_10001");
        assert_eq!(lookups.optional_field_id("% Done").unwrap(), None);
        assert!(matches!(
            lookups.field_id("Team"),
            Err(JiraError::FieldNotFound(name)) if name == "Team"
        ));
    }
}
