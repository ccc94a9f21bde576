//! Workflow transition chains.
//!
//! A migrated issue is created in the target's initial state and then walked
//! through a chain of statuses until it reaches the status it had in the
//! source. Chains are declared in a [`TransitionTable`]; [`walk_chain`]
//! applies one plan in order and records what happened to each step.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::PublishError;
use crate::retry::RetryPolicy;
use crate::target::{Transition, WorkflowTarget};

/// Field payload for one transition, keyed by remote field id.
pub type TransitionFields = BTreeMap<String, Value>;

/// One status to move through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionStep {
    pub status: String,
    /// Candidate fields; only those the transition declares are sent.
    pub fields: TransitionFields,
}

impl TransitionStep {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            fields: TransitionFields::new(),
        }
    }
}

/// Ordered transitions leading to a target status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowTransitionPlan {
    pub steps: Vec<TransitionStep>,
}

impl WorkflowTransitionPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Statuses in order.
    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.status.as_str())
    }
}

/// Declarative `terminal status -> chain` table.
///
/// A chain entry that names another terminal status stands for that status's
/// whole chain, so `CLOSED = [RESOLVED, CLOSED]` walks every step towards
/// `RESOLVED` first. Statuses are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    chains: BTreeMap<String, Vec<String>>,
}

impl TransitionTable {
    pub fn new<I, S, C>(chains: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let chains = chains
            .into_iter()
            .map(|(terminal, chain)| {
                (
                    terminal.as_ref().to_uppercase(),
                    chain
                        .into_iter()
                        .map(|status| status.as_ref().to_uppercase())
                        .collect(),
                )
            })
            .collect();
        Self { chains }
    }

    /// Expanded chain of statuses leading to `status`.
    ///
    /// A status without an entry is reached in a single step.
    #[must_use]
    pub fn chain(&self, status: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut expanding = HashSet::new();
        self.expand(&status.to_uppercase(), &mut expanding, &mut out);
        out
    }

    fn expand(&self, status: &str, expanding: &mut HashSet<String>, out: &mut Vec<String>) {
        let Some(chain) = self.chains.get(status) else {
            out.push(status.to_owned());
            return;
        };
        expanding.insert(status.to_owned());
        for entry in chain {
            if entry != status && self.chains.contains_key(entry) && !expanding.contains(entry) {
                self.expand(entry, expanding, out);
            } else if out.last() != Some(entry) {
                out.push(entry.clone());
            }
        }
        expanding.remove(status);
    }

    /// Plan reaching `status`, with candidate fields per step.
    #[must_use]
    pub fn plan(
        &self,
        status: &str,
        fields: &BTreeMap<String, TransitionFields>,
    ) -> WorkflowTransitionPlan {
        let steps = self
            .chain(status)
            .into_iter()
            .map(|status| {
                let fields = fields
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&status))
                    .map(|(_, fields)| fields.clone())
                    .unwrap_or_default();
                TransitionStep { status, fields }
            })
            .collect();
        WorkflowTransitionPlan { steps }
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Transition applied with these field ids.
    Applied { fields: Vec<String> },
    /// No transition to the status was offered; lists what was.
    Unavailable { available: Vec<String> },
    /// The remote call failed; the walk stops here.
    Failed { error: String },
}

/// One entry of a [`TransitionLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub status: String,
    pub outcome: TransitionOutcome,
}

/// Per-step results of walking a plan, in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionLog {
    pub entries: Vec<TransitionRecord>,
}

impl TransitionLog {
    /// Statuses that were applied, in order.
    pub fn applied(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TransitionOutcome::Applied { .. }))
            .map(|e| e.status.as_str())
    }

    /// Whether every step was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.outcome, TransitionOutcome::Applied { .. }))
    }

    fn push(&mut self, status: &str, outcome: TransitionOutcome) {
        self.entries.push(TransitionRecord {
            status: status.to_owned(),
            outcome,
        });
    }
}

/// Walk `plan` on the issue `remote_id`, strictly in order.
///
/// Each step is attempted only when the target currently offers a transition
/// to its status. Unavailable steps are logged and skipped. A failed call
/// ends the walk, since later states may depend on it. Fatal errors are
/// returned to the caller.
pub fn walk_chain(
    target: &dyn WorkflowTarget,
    remote_id: &str,
    plan: &WorkflowTransitionPlan,
    retry: &RetryPolicy,
) -> Result<TransitionLog, PublishError> {
    let mut log = TransitionLog::default();

    for step in &plan.steps {
        let available = match retry.run("list transitions", || {
            target.available_transitions(remote_id)
        }) {
            Ok(available) => available,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(remote_id, status = %step.status, error = %err, "Cannot list transitions");
                log.push(&step.status, TransitionOutcome::Failed { error: err.to_string() });
                break;
            }
        };

        let Some(transition) = available.iter().find(|t| t.reaches(&step.status)) else {
            tracing::warn!(remote_id, status = %step.status, "No transition available");
            log.push(
                &step.status,
                TransitionOutcome::Unavailable {
                    available: available.iter().map(|t| t.to_status.clone()).collect(),
                },
            );
            continue;
        };

        let fields = payload_for(transition, &step.fields);
        match retry.run("apply transition", || {
            target.apply_transition(remote_id, transition, &fields)
        }) {
            Ok(()) => {
                tracing::info!(remote_id, status = %step.status, "Transitioned");
                log.push(
                    &step.status,
                    TransitionOutcome::Applied {
                        fields: fields.keys().cloned().collect(),
                    },
                );
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(remote_id, status = %step.status, error = %err, "Transition failed");
                log.push(&step.status, TransitionOutcome::Failed { error: err.to_string() });
                break;
            }
        }
    }

    Ok(log)
}

/// Candidate fields filtered to those the transition declares.
fn payload_for(transition: &Transition, candidates: &TransitionFields) -> TransitionFields {
    candidates
        .iter()
        .filter(|(field, _)| transition.fields.iter().any(|f| f == *field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}
