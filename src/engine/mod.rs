//! Engine: estimation, planning, scheduling, monitoring, aggregation and the CLI around them.

pub mod aggregate;
pub mod arg_parser;
pub mod cli;
pub mod core;
pub mod estimator;
pub mod hooks;
pub mod monitor;
pub mod planner;
pub mod progress;
pub mod report;
pub mod scheduler;

// Re-export commonly used items
pub use aggregate::{AggregateSummary, Aggregator};
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use core::{Collaborators, RunOutcome, RunReport, run_batch};
pub use estimator::{EstimatorSettings, MemorySnapshot, ResourceEstimator};
pub use hooks::{Progress, RunHooks, SubProgress, SubStage};
pub use monitor::{RateWindow, ThroughputMonitor, ThroughputSample};
pub use planner::{plan_capacity, revise_worker_count};
pub use report::write_report;
pub use scheduler::run_pool;
