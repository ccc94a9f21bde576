//! Remote system seams used by the sequencer.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::PublishError;
use crate::unit::PublishUnit;

/// Remote system that documents are published to.
///
/// Implementations classify their failures into [`PublishError`] kinds; the
/// sequencer relies on `Conflict` for idempotent re-runs and on
/// `ContentTooLarge` for the fallback body.
pub trait PublishTarget {
    /// Assembled document body accepted by the target.
    type Body;

    /// Remote id of a document already published for `unit`.
    fn find_existing(&self, unit: &PublishUnit<Self::Body>) -> Result<Option<String>, PublishError>;

    /// Create the document and return its remote id.
    fn create(
        &self,
        unit: &PublishUnit<Self::Body>,
        parent_id: Option<&str>,
        body: &Self::Body,
    ) -> Result<String, PublishError>;

    fn delete(&self, remote_id: &str) -> Result<(), PublishError>;

    fn upload_attachment(
        &self,
        remote_id: &str,
        filename: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), PublishError>;

    /// Remote id of a parent that is not part of this run, if it was
    /// published earlier.
    fn resolve_parent(&self, _parent_key: &str) -> Result<Option<String>, PublishError> {
        Ok(None)
    }
}

/// Pulls bytes of remote assets at upload time.
///
/// Shared with importers that prepare documents in parallel.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError>;
}

/// Transition offered by the remote workflow from the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Status the transition leads to.
    pub to_status: String,
    /// Field ids the transition screen accepts.
    pub fields: Vec<String>,
}

impl Transition {
    /// Whether this transition reaches `status` (case-insensitive).
    #[must_use]
    pub fn reaches(&self, status: &str) -> bool {
        self.to_status.eq_ignore_ascii_case(status)
    }
}

/// Remote workflow of an issue tracker.
pub trait WorkflowTarget {
    fn available_transitions(&self, remote_id: &str) -> Result<Vec<Transition>, PublishError>;

    fn apply_transition(
        &self,
        remote_id: &str,
        transition: &Transition,
        fields: &BTreeMap<String, Value>,
    ) -> Result<(), PublishError>;
}
