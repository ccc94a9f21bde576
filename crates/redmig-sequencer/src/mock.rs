//! In-memory targets for testing.
//!
//! [`MockTarget`] stores documents and attachments in memory and reproduces
//! the failure modes the sequencer reacts to. [`MockWorkflow`] is a linear
//! issue workflow. [`MockFetcher`] serves remote asset bytes from a map.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use serde_json::Value;

use crate::error::PublishError;
use crate::target::{AssetFetcher, PublishTarget, Transition, WorkflowTarget};
use crate::unit::PublishUnit;

/// Document stored by [`MockTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDocument {
    pub id: String,
    pub title: String,
    pub parent_id: Option<String>,
    pub body: String,
}

/// In-memory publish target with `String` bodies.
///
/// # Example
///
/// ```ignore
/// let target = MockTarget::new().with_existing("Home (Legacy)");
/// let report = Sequencer::new(&target).publish(&units)?;
/// ```
#[derive(Debug, Default)]
pub struct MockTarget {
    documents: RwLock<Vec<MockDocument>>,
    attachments: RwLock<Vec<(String, String, usize)>>,
    external: RwLock<HashMap<String, String>>,
    rejected_titles: RwLock<HashSet<String>>,
    transient_uploads: Mutex<HashMap<String, usize>>,
    stale_lookups: Mutex<usize>,
    max_body_len: Option<usize>,
    next_id: Mutex<usize>,
    calls: Mutex<Vec<String>>,
}

impl MockTarget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document that already exists remotely.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_existing(self, title: impl Into<String>) -> Self {
        let id = self.allocate_id();
        self.documents.write().unwrap().push(MockDocument {
            id,
            title: title.into(),
            parent_id: None,
            body: String::new(),
        });
        self
    }

    /// Make `resolve_parent(key)` return `id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_external_parent(self, key: impl Into<String>, id: impl Into<String>) -> Self {
        self.external.write().unwrap().insert(key.into(), id.into());
        self
    }

    /// Reject bodies longer than `len` bytes as too large.
    #[must_use]
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_body_len = Some(len);
        self
    }

    /// The next `count` existence lookups find nothing.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_stale_lookups(self, count: usize) -> Self {
        *self.stale_lookups.lock().unwrap() = count;
        self
    }

    /// Uploads of `filename` fail transiently `count` times.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_transient_upload_failures(self, filename: impl Into<String>, count: usize) -> Self {
        self.transient_uploads
            .lock()
            .unwrap()
            .insert(filename.into(), count);
        self
    }

    /// Creating a document with this title is rejected.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn rejecting(self, title: impl Into<String>) -> Self {
        self.rejected_titles.write().unwrap().insert(title.into());
        self
    }

    /// All stored documents.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn documents(&self) -> Vec<MockDocument> {
        self.documents.read().unwrap().clone()
    }

    /// Document with the given title.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn document(&self, title: &str) -> Option<MockDocument> {
        self.documents
            .read()
            .unwrap()
            .iter()
            .find(|d| d.title == title)
            .cloned()
    }

    /// Filenames attached to a document, in upload order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn attachments(&self, id: &str) -> Vec<String> {
        self.attachments
            .read()
            .unwrap()
            .iter()
            .filter(|(doc, _, _)| doc == id)
            .map(|(_, name, _)| name.clone())
            .collect()
    }

    /// Mutating calls made so far, as `operation:argument`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{}", 100 + *next)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PublishTarget for MockTarget {
    type Body = String;

    fn find_existing(&self, unit: &PublishUnit<String>) -> Result<Option<String>, PublishError> {
        {
            let mut stale = self.stale_lookups.lock().unwrap();
            if *stale > 0 {
                *stale -= 1;
                return Ok(None);
            }
        }
        Ok(self.document(&unit.title).map(|d| d.id))
    }

    fn create(
        &self,
        unit: &PublishUnit<String>,
        parent_id: Option<&str>,
        body: &String,
    ) -> Result<String, PublishError> {
        self.record(format!("create:{}", unit.title));
        if self.rejected_titles.read().unwrap().contains(&unit.title) {
            return Err(PublishError::from_http(400, "invalid storage format"));
        }
        if self.max_body_len.is_some_and(|max| body.len() > max) {
            return Err(PublishError::from_http(400, "CONTENT_LIMIT_EXCEEDED"));
        }
        if self.document(&unit.title).is_some() {
            return Err(PublishError::from_http(
                400,
                "A page with this title already exists",
            ));
        }
        let id = self.allocate_id();
        self.documents.write().unwrap().push(MockDocument {
            id: id.clone(),
            title: unit.title.clone(),
            parent_id: parent_id.map(str::to_owned),
            body: body.clone(),
        });
        Ok(id)
    }

    fn delete(&self, remote_id: &str) -> Result<(), PublishError> {
        self.record(format!("delete:{remote_id}"));
        let mut documents = self.documents.write().unwrap();
        let before = documents.len();
        documents.retain(|d| d.id != remote_id);
        if documents.len() == before {
            return Err(PublishError::not_found(remote_id));
        }
        Ok(())
    }

    fn upload_attachment(
        &self,
        remote_id: &str,
        filename: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<(), PublishError> {
        self.record(format!("upload:{filename}"));
        if let Some(remaining) = self.transient_uploads.lock().unwrap().get_mut(filename)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(PublishError::from_http(502, "bad gateway"));
        }
        let mut attachments = self.attachments.write().unwrap();
        if attachments
            .iter()
            .any(|(doc, name, _)| doc == remote_id && name == filename)
        {
            return Err(PublishError::from_http(
                400,
                "Cannot add a new attachment with same file name as an existing attachment",
            ));
        }
        attachments.push((remote_id.to_owned(), filename.to_owned(), data.len()));
        Ok(())
    }

    fn resolve_parent(&self, parent_key: &str) -> Result<Option<String>, PublishError> {
        Ok(self.external.read().unwrap().get(parent_key).cloned())
    }
}

/// Linear workflow: from each status only the next one is reachable.
#[derive(Debug, Default)]
pub struct MockWorkflow {
    statuses: Vec<String>,
    fields: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    current: RwLock<HashMap<String, usize>>,
    applied: RwLock<HashMap<String, Vec<BTreeMap<String, Value>>>>,
}

impl MockWorkflow {
    /// Workflow through `statuses`; every issue starts at the first one.
    #[must_use]
    pub fn linear(statuses: &[&str]) -> Self {
        Self {
            statuses: statuses.iter().map(|s| (*s).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// Transition into `status` declares `fields`.
    #[must_use]
    pub fn with_fields(mut self, status: &str, fields: &[&str]) -> Self {
        self.fields.insert(
            status.to_owned(),
            fields.iter().map(|f| (*f).to_owned()).collect(),
        );
        self
    }

    /// Transition into `status` is offered but fails when applied.
    #[must_use]
    pub fn failing_on(mut self, status: &str) -> Self {
        self.failing.insert(status.to_owned());
        self
    }

    /// Current status of an issue.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn status(&self, remote_id: &str) -> String {
        let idx = self
            .current
            .read()
            .unwrap()
            .get(remote_id)
            .copied()
            .unwrap_or(0);
        self.statuses.get(idx).cloned().unwrap_or_default()
    }

    /// Field payloads applied to an issue, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn applied_fields(&self, remote_id: &str) -> Vec<BTreeMap<String, Value>> {
        self.applied
            .read()
            .unwrap()
            .get(remote_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl WorkflowTarget for MockWorkflow {
    fn available_transitions(&self, remote_id: &str) -> Result<Vec<Transition>, PublishError> {
        let idx = self
            .current
            .read()
            .unwrap()
            .get(remote_id)
            .copied()
            .unwrap_or(0);
        Ok(self
            .statuses
            .get(idx + 1)
            .map(|next| Transition {
                id: format!("{}", idx + 1),
                name: format!("To {next}"),
                to_status: next.clone(),
                fields: self.fields.get(next).cloned().unwrap_or_default(),
            })
            .into_iter()
            .collect())
    }

    fn apply_transition(
        &self,
        remote_id: &str,
        transition: &Transition,
        fields: &BTreeMap<String, Value>,
    ) -> Result<(), PublishError> {
        if self.failing.contains(&transition.to_status) {
            return Err(PublishError::from_http(400, "transition screen validation failed"));
        }
        let Some(idx) = self.statuses.iter().position(|s| *s == transition.to_status) else {
            return Err(PublishError::not_found(transition.to_status.clone()));
        };
        self.current
            .write()
            .unwrap()
            .insert(remote_id.to_owned(), idx);
        self.applied
            .write()
            .unwrap()
            .entry(remote_id.to_owned())
            .or_default()
            .push(fields.clone());
        Ok(())
    }
}

/// Serves remote asset bytes from memory.
#[derive(Debug, Default)]
pub struct MockFetcher {
    assets: HashMap<String, Vec<u8>>,
}

impl MockFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_asset(mut self, url: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.assets.insert(url.into(), data.into());
        self
    }
}

impl AssetFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError> {
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| PublishError::from_http(404, url))
    }
}
