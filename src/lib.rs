//! lasbatch: memory-aware batch processing of LAS point-cloud files.
//!
//! A run sizes a worker pool against available memory, shows the [`CapacityPlan`] to a
//! preflight gate, then drives every [`WorkItem`] through a cancellable per-item pipeline and
//! folds the results into an [`AggregateSummary`].

pub mod decode;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod probe;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use engine::{
    AggregateSummary, Collaborators, Progress, RunHooks, RunOutcome, RunReport, SubProgress,
    SubStage,
};
pub use error::{ItemError, PlanError};
pub use pipeline::CancellationToken;

use log::debug;

/// Result alias used by the public lasbatch API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: plan a run over `work_items`, hand the plan to the confirm hook, then
/// process every item.
///
/// - Planning failures (empty batch, invalid options, memory unavailable) are returned as `Err`
///   before any item starts; downcast to [`PlanError`] to tell them apart.
/// - A declined plan returns [`RunOutcome::Declined`].
/// - Otherwise [`RunOutcome::Finished`] holds exactly one [`ProcessingResult`] per item, whether
///   it completed, failed or was cancelled.
pub fn run(
    work_items: Vec<WorkItem>,
    options: &RunOptions,
    collaborators: &Collaborators,
    cancel: &CancellationToken,
    hooks: RunHooks<'_>,
) -> Result<RunOutcome> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        options
    );
    engine::run_batch(work_items, options, collaborators, cancel, hooks)
}
