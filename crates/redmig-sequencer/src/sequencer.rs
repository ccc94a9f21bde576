//! Wave-ordered, idempotent publication.

use std::collections::{HashMap, HashSet};

use redmig_markup::AssetLocator;
use tracing::{error, info, warn};

use crate::error::{PublishError, PublishErrorKind};
use crate::retry::RetryPolicy;
use crate::target::{AssetFetcher, PublishTarget, WorkflowTarget};
use crate::unit::{AssetFile, PublishUnit};
use crate::waves::{DependencyGraph, Unplaced};
use crate::workflow::{TransitionLog, walk_chain};

/// What to do when a unit already exists remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistingPolicy {
    /// Keep the remote document and report its id.
    #[default]
    Skip,
    /// Delete the remote document and create it again.
    Recreate,
}

/// Sequencer behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencerOptions {
    /// Stop after the first failed unit.
    pub fail_fast: bool,
    pub existing: ExistingPolicy,
    /// Upload attachments to documents that already existed.
    pub upload_to_existing: bool,
    /// Key that parentless units hang under.
    pub root_key: Option<String>,
    /// Remote id used as parent for units without one.
    pub root_parent_id: Option<String>,
}

/// A unit that has a remote id after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub key: String,
    pub title: String,
    pub remote_id: String,
    pub parent_id: Option<String>,
    /// Created with the fallback body.
    pub used_fallback: bool,
}

/// A unit that failed with a non-fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub key: String,
    pub title: String,
    pub operation: &'static str,
    pub error: String,
}

/// An attachment that could not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub key: String,
    pub filename: String,
    pub error: String,
}

/// Attachment upload counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: usize,
    pub skipped_empty: usize,
    pub already_present: usize,
    pub failures: Vec<UploadFailure>,
}

/// Workflow walk of one created unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowResult {
    pub key: String,
    pub remote_id: String,
    pub log: TransitionLog,
}

/// Result of a sequencer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub created: Vec<Published>,
    pub existing: Vec<Published>,
    pub unplaced: Vec<Unplaced>,
    pub failures: Vec<UnitFailure>,
    pub uploads: UploadStats,
    pub workflows: Vec<WorkflowResult>,
    /// Waves that published at least one unit.
    pub waves: usize,
    /// Fail-fast stopped the run.
    pub halted: bool,
    /// Keys never attempted because the run halted.
    pub not_attempted: Vec<String>,
}

impl PublishReport {
    /// Remote id of a unit that was created or already existed.
    #[must_use]
    pub fn remote_id(&self, key: &str) -> Option<&str> {
        self.created
            .iter()
            .chain(&self.existing)
            .find(|p| p.key == key)
            .map(|p| p.remote_id.as_str())
    }

    /// Whether nothing went wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.halted
            && self.unplaced.is_empty()
            && self.failures.is_empty()
            && self.uploads.failures.is_empty()
            && self.workflows.iter().all(|w| w.log.is_complete())
    }
}

/// Publishes units against one target.
pub struct Sequencer<'a, T: PublishTarget> {
    target: &'a T,
    fetcher: Option<&'a dyn AssetFetcher>,
    workflow: Option<&'a dyn WorkflowTarget>,
    options: SequencerOptions,
    retry: RetryPolicy,
}

struct StepError {
    operation: &'static str,
    error: PublishError,
}

fn at(operation: &'static str) -> impl Fn(PublishError) -> StepError {
    move |error| StepError { operation, error }
}

impl<'a, T: PublishTarget> Sequencer<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self {
            target,
            fetcher: None,
            workflow: None,
            options: SequencerOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn options(mut self, options: SequencerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Source of bytes for URL assets.
    #[must_use]
    pub fn fetcher(mut self, fetcher: &'a dyn AssetFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Workflow used for units that carry a transition plan.
    #[must_use]
    pub fn workflow(mut self, workflow: &'a dyn WorkflowTarget) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// Publish `units` in parent-before-child waves.
    ///
    /// Per-unit failures are recorded in the report. Only fatal errors end
    /// the run with `Err`; documents published before that stay published.
    pub fn publish(&self, units: &[PublishUnit<T::Body>]) -> Result<PublishReport, PublishError> {
        let graph = DependencyGraph::build(units, self.options.root_key.as_deref())?;
        let mut report = PublishReport::default();
        let mut placed: HashMap<String, String> = HashMap::new();
        let mut failed: HashSet<String> = HashSet::new();

        for parent in graph.external_parents() {
            match self
                .retry
                .run("resolve parent", || self.target.resolve_parent(parent))
            {
                Ok(Some(remote_id)) => {
                    info!(parent, remote_id = %remote_id, "Parent exists remotely");
                    placed.insert(parent.to_owned(), remote_id);
                }
                Ok(None) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(parent, error = %err, "Cannot look up parent"),
            }
        }

        let mut pending: Vec<usize> = (0..units.len()).collect();
        loop {
            let (ready, rest): (Vec<usize>, Vec<usize>) = pending
                .iter()
                .partition(|&&idx| graph.is_ready(idx, &placed));
            if ready.is_empty() {
                break;
            }
            report.waves += 1;
            info!(wave = report.waves, units = ready.len(), "Publishing wave");

            for (pos, &idx) in ready.iter().enumerate() {
                let unit = &units[idx];
                let parent_id = match graph.parent(idx) {
                    Some(parent) => placed.get(parent).cloned(),
                    None => self.options.root_parent_id.clone(),
                };

                match self.publish_unit(unit, parent_id.as_deref(), &mut report) {
                    Ok(remote_id) => {
                        placed.insert(unit.key.clone(), remote_id);
                    }
                    Err(StepError { error, .. }) if error.is_fatal() => return Err(error),
                    Err(StepError { operation, error }) => {
                        error!(key = %unit.key, title = %unit.title, operation, error = %error, "Publication failed");
                        failed.insert(unit.key.clone());
                        report.failures.push(UnitFailure {
                            key: unit.key.clone(),
                            title: unit.title.clone(),
                            operation,
                            error: error.to_string(),
                        });
                        if self.options.fail_fast {
                            report.halted = true;
                            report.not_attempted = ready[pos + 1..]
                                .iter()
                                .chain(&rest)
                                .map(|&i| units[i].key.clone())
                                .collect();
                            return Ok(report);
                        }
                    }
                }
            }
            pending = rest;
        }

        report.unplaced = pending
            .into_iter()
            .map(|idx| graph.unplaced(idx, &failed))
            .collect();
        for unplaced in &report.unplaced {
            warn!(key = %unplaced.key, parent = ?unplaced.parent, reason = ?unplaced.reason, "Unit not placed");
        }
        Ok(report)
    }

    fn publish_unit(
        &self,
        unit: &PublishUnit<T::Body>,
        parent_id: Option<&str>,
        report: &mut PublishReport,
    ) -> Result<String, StepError> {
        let existing = self
            .retry
            .run("find existing", || self.target.find_existing(unit))
            .map_err(at("find existing"))?;

        if let Some(remote_id) = existing {
            match self.options.existing {
                ExistingPolicy::Skip => {
                    return self.adopt_existing(unit, remote_id, parent_id, report);
                }
                ExistingPolicy::Recreate => {
                    info!(key = %unit.key, title = %unit.title, remote_id = %remote_id, "Deleting existing document");
                    self.retry
                        .run("delete", || self.target.delete(&remote_id))
                        .map_err(at("delete"))?;
                }
            }
        }

        let (remote_id, used_fallback) = match self.create(unit, parent_id, &unit.body) {
            Ok(remote_id) => (remote_id, false),
            Err(err) if err.kind == PublishErrorKind::Conflict => {
                let found = self
                    .retry
                    .run("find existing", || self.target.find_existing(unit))
                    .map_err(at("find existing"))?;
                return match found {
                    Some(remote_id) => self.adopt_existing(unit, remote_id, parent_id, report),
                    None => Err(at("create")(err)),
                };
            }
            Err(err) if err.kind == PublishErrorKind::ContentTooLarge => {
                let Some(fallback) = &unit.fallback else {
                    return Err(at("create")(err));
                };
                warn!(key = %unit.key, title = %unit.title, "Body too large, using fallback");
                let remote_id = self
                    .create(unit, parent_id, &fallback.body)
                    .map_err(at("create fallback"))?;
                (remote_id, true)
            }
            Err(err) => return Err(at("create")(err)),
        };
        info!(key = %unit.key, title = %unit.title, remote_id = %remote_id, "Created");

        let extra: &[AssetFile] = match (&unit.fallback, used_fallback) {
            (Some(fallback), true) => fallback.attachments.as_slice(),
            _ => &[],
        };
        self.upload_all(unit, &remote_id, unit.attachments.iter().chain(extra), report)?;

        if let (Some(plan), Some(workflow)) = (&unit.workflow, self.workflow)
            && !plan.is_empty()
        {
            let log = walk_chain(workflow, &remote_id, plan, &self.retry).map_err(at("transition"))?;
            report.workflows.push(WorkflowResult {
                key: unit.key.clone(),
                remote_id: remote_id.clone(),
                log,
            });
        }

        report.created.push(Published {
            key: unit.key.clone(),
            title: unit.title.clone(),
            remote_id: remote_id.clone(),
            parent_id: parent_id.map(str::to_owned),
            used_fallback,
        });
        Ok(remote_id)
    }

    fn create(
        &self,
        unit: &PublishUnit<T::Body>,
        parent_id: Option<&str>,
        body: &T::Body,
    ) -> Result<String, PublishError> {
        self.retry
            .run("create", || self.target.create(unit, parent_id, body))
    }

    fn adopt_existing(
        &self,
        unit: &PublishUnit<T::Body>,
        remote_id: String,
        parent_id: Option<&str>,
        report: &mut PublishReport,
    ) -> Result<String, StepError> {
        info!(key = %unit.key, title = %unit.title, remote_id = %remote_id, "Already published");
        if self.options.upload_to_existing {
            self.upload_all(unit, &remote_id, unit.attachments.iter(), report)?;
        }
        report.existing.push(Published {
            key: unit.key.clone(),
            title: unit.title.clone(),
            remote_id: remote_id.clone(),
            parent_id: parent_id.map(str::to_owned),
            used_fallback: false,
        });
        Ok(remote_id)
    }

    /// Upload files one at a time. Only fatal errors are returned.
    fn upload_all<'f>(
        &self,
        unit: &PublishUnit<T::Body>,
        remote_id: &str,
        files: impl Iterator<Item = &'f AssetFile>,
        report: &mut PublishReport,
    ) -> Result<(), StepError> {
        for file in files {
            let outcome = self.read_asset(file).and_then(|data| {
                if data.is_empty() {
                    return Ok(UploadOutcome::Empty);
                }
                self.retry
                    .run("upload", || {
                        self.target
                            .upload_attachment(remote_id, &file.filename, &data, file.content_type())
                    })
                    .map(|()| UploadOutcome::Uploaded)
            });

            match outcome {
                Ok(UploadOutcome::Uploaded) => report.uploads.uploaded += 1,
                Ok(UploadOutcome::Empty) => {
                    info!(key = %unit.key, filename = %file.filename, "Skipping empty file");
                    report.uploads.skipped_empty += 1;
                }
                Err(err) if err.kind == PublishErrorKind::Conflict => {
                    report.uploads.already_present += 1;
                }
                Err(err) if err.is_fatal() => return Err(at("upload")(err)),
                Err(err) => {
                    warn!(key = %unit.key, filename = %file.filename, error = %err, "Upload failed");
                    report.uploads.failures.push(UploadFailure {
                        key: unit.key.clone(),
                        filename: file.filename.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn read_asset(&self, file: &AssetFile) -> Result<Vec<u8>, PublishError> {
        match &file.source {
            AssetLocator::Path(path) => Ok(std::fs::read(path)?),
            AssetLocator::Url(url) => {
                let Some(fetcher) = self.fetcher else {
                    return Err(PublishError::not_found(format!("no fetcher for {url}")));
                };
                self.retry.run("fetch asset", || fetcher.fetch(url))
            }
        }
    }
}

enum UploadOutcome {
    Uploaded,
    Empty,
}
