//! Publication sequencer for redmig.
//!
//! Takes assembled documents as [`PublishUnit`]s and creates them on a remote
//! target in parent-before-child order:
//!
//! - [`DependencyGraph`] plans waves and explains units that can never be
//!   placed (missing parent, cycle, failed ancestor);
//! - [`Sequencer`] publishes wave by wave with create-or-skip semantics,
//!   falls back to a smaller body when the target refuses a large one, and
//!   uploads attachments one at a time once the document exists;
//! - [`TransitionTable`] and [`walk_chain`] move created issues through
//!   their workflow;
//! - [`MemoLookup`] caches remote id lookups.
//!
//! Remote systems plug in through [`PublishTarget`], [`WorkflowTarget`] and
//! [`AssetFetcher`]. In-memory implementations live behind the `mock`
//! feature.

mod error;
mod lookup;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod retry;
mod sequencer;
mod target;
mod unit;
mod waves;
mod workflow;

pub use error::{PublishError, PublishErrorKind};
pub use lookup::MemoLookup;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockDocument, MockFetcher, MockTarget, MockWorkflow};
pub use retry::RetryPolicy;
pub use sequencer::{
    ExistingPolicy, PublishReport, Published, Sequencer, SequencerOptions, UnitFailure,
    UploadFailure, UploadStats, WorkflowResult,
};
pub use target::{AssetFetcher, PublishTarget, Transition, WorkflowTarget};
pub use unit::{AssetFile, Fallback, PublishUnit};
pub use waves::{DependencyGraph, GraphNode, Unplaced, UnplacedReason, WavePlan};
pub use workflow::{
    TransitionFields, TransitionLog, TransitionOutcome, TransitionRecord, TransitionStep,
    TransitionTable, WorkflowTransitionPlan, walk_chain,
};
