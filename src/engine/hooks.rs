//! Presentation-side hooks: preflight confirmation and the progress / sub-progress / throughput callbacks.

use std::fmt;

use crate::CapacityPlan;

/// Fired once per completed item, on the caller's thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub item_id: &'a str,
}

/// Advisory stage notices for long items. Never required for correctness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubStage {
    Decoding,
    Sampling { stride: usize, source_points: usize },
    ComputingHull { points: usize },
    BoundingExtentFallback,
}

impl fmt::Display for SubStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubStage::Decoding => write!(f, "decoding"),
            SubStage::Sampling {
                stride,
                source_points,
            } => write!(f, "sampling every {stride} of {source_points} points"),
            SubStage::ComputingHull { points } => write!(f, "computing hull of {points} points"),
            SubStage::BoundingExtentFallback => write!(f, "hull degenerate, using bounding extent"),
        }
    }
}

/// Fired from worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubProgress<'a> {
    pub item_id: &'a str,
    pub stage: SubStage,
}

pub type ConfirmFn<'a> = Box<dyn FnOnce(&CapacityPlan) -> bool + 'a>;
pub type ProgressFn<'a> = Box<dyn FnMut(Progress<'_>) + 'a>;
pub type SubProgressFn<'a> = Box<dyn Fn(SubProgress<'_>) + Send + Sync + 'a>;
/// Smoothed read rate in bytes per second, from the monitor thread.
pub type ThroughputFn<'a> = Box<dyn Fn(f64) + Send + Sync + 'a>;

/// Callbacks for one run. The confirm gate is mandatory; the rest are optional.
pub struct RunHooks<'a> {
    pub(crate) confirm: ConfirmFn<'a>,
    pub(crate) on_progress: Option<ProgressFn<'a>>,
    pub(crate) on_sub_progress: Option<SubProgressFn<'a>>,
    pub(crate) on_throughput: Option<ThroughputFn<'a>>,
}

impl<'a> RunHooks<'a> {
    /// `confirm` receives the plan before any item starts; returning false aborts the run.
    pub fn new(confirm: impl FnOnce(&CapacityPlan) -> bool + 'a) -> Self {
        Self {
            confirm: Box::new(confirm),
            on_progress: None,
            on_sub_progress: None,
            on_throughput: None,
        }
    }

    /// Approve whatever plan is proposed (non-interactive callers).
    pub fn approve_all() -> Self {
        Self::new(|_| true)
    }

    pub fn on_progress(mut self, f: impl FnMut(Progress<'_>) + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_sub_progress(mut self, f: impl Fn(SubProgress<'_>) + Send + Sync + 'a) -> Self {
        self.on_sub_progress = Some(Box::new(f));
        self
    }

    pub fn on_throughput(mut self, f: impl Fn(f64) + Send + Sync + 'a) -> Self {
        self.on_throughput = Some(Box::new(f));
        self
    }
}
