//! Run orchestration: plan, preflight gate, worker pool plus throughput monitor, aggregation.

use anyhow::Result;
use crossbeam_channel::bounded;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::decode::{Decoder, LasDecoder};
use crate::geometry::{HullBuilder, MonotoneChainHull};
use crate::pipeline::{CancellationToken, ItemPipeline};
use crate::probe::{MemoryProbe, SysinfoProbe};
use crate::types::serialize_secs;
use crate::{CapacityPlan, ProcessingResult, RunOptions, WorkItem};

use super::aggregate::{AggregateSummary, Aggregator};
use super::estimator::{EstimatorSettings, ResourceEstimator};
use super::hooks::RunHooks;
use super::monitor::ThroughputMonitor;
use super::planner::plan_capacity;
use super::scheduler::run_pool;

/// Injected external capabilities. Tests swap in fakes; the CLI uses [`Collaborators::system`].
#[derive(Clone)]
pub struct Collaborators {
    pub decoder: Arc<dyn Decoder>,
    pub hull: Arc<dyn HullBuilder>,
    pub memory: Arc<dyn MemoryProbe>,
}

impl Collaborators {
    pub fn new(
        decoder: Arc<dyn Decoder>,
        hull: Arc<dyn HullBuilder>,
        memory: Arc<dyn MemoryProbe>,
    ) -> Self {
        Self {
            decoder,
            hull,
            memory,
        }
    }

    /// LAS decoder, monotone-chain hull and the sysinfo memory probe.
    pub fn system() -> Result<Self> {
        Ok(Self::new(
            Arc::new(LasDecoder),
            Arc::new(MonotoneChainHull),
            Arc::new(SysinfoProbe::new()?),
        ))
    }
}

/// Everything a finished run produced.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub plan: CapacityPlan,
    pub summary: AggregateSummary,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Last smoothed read rate, bytes per second.
    pub throughput_bytes_per_sec: f64,
    /// At least one item ended cancelled.
    pub cancelled: bool,
    /// The token was set at some point, possibly after every item had finished.
    pub cancel_requested: bool,
}

impl RunReport {
    /// One result per submitted item, in completion order.
    pub fn results(&self) -> &[ProcessingResult] {
        self.summary.results()
    }

    pub fn into_parts(self) -> (Vec<ProcessingResult>, AggregateSummary) {
        (self.summary.results.clone(), self.summary)
    }
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// Preflight gate said no; no item started.
    Declined(CapacityPlan),
    Finished(RunReport),
}

impl RunOutcome {
    pub fn is_declined(&self) -> bool {
        matches!(self, RunOutcome::Declined(_))
    }

    pub fn plan(&self) -> &CapacityPlan {
        match self {
            RunOutcome::Declined(plan) => plan,
            RunOutcome::Finished(report) => &report.plan,
        }
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Finished(report) => Some(report),
            RunOutcome::Declined(_) => None,
        }
    }

    pub fn into_report(self) -> Option<RunReport> {
        match self {
            RunOutcome::Finished(report) => Some(report),
            RunOutcome::Declined(_) => None,
        }
    }
}

/// Plan, confirm, then process every item. Plan failures return `Err` before any work;
/// per-item failures are results, never errors.
pub fn run_batch(
    work_items: Vec<WorkItem>,
    options: &RunOptions,
    collaborators: &Collaborators,
    cancel: &CancellationToken,
    hooks: RunHooks<'_>,
) -> Result<RunOutcome> {
    let estimator = ResourceEstimator::new(
        Arc::clone(&collaborators.memory),
        EstimatorSettings::from(options),
    );
    let plan = plan_capacity(&work_items, options, &estimator)?;

    let RunHooks {
        confirm,
        mut on_progress,
        on_sub_progress,
        on_throughput,
    } = hooks;
    if !confirm(&plan) {
        info!("Run declined at preflight; no items processed");
        return Ok(RunOutcome::Declined(plan));
    }

    let started = Instant::now();
    let pipeline = ItemPipeline {
        decoder: Arc::clone(&collaborators.decoder),
        hull: Arc::clone(&collaborators.hull),
        estimator: &estimator,
        options,
        cancel,
        worker_count: plan.worker_count,
        sub_progress: on_sub_progress.as_deref(),
    };
    let aggregator = Aggregator::new();
    let monitor = ThroughputMonitor::new(
        Arc::clone(&collaborators.memory),
        options.monitor_interval,
        options.monitor_window,
    );
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let pooled = thread::scope(|s| {
        let monitor_handle = s.spawn(|| monitor.run_until(&stop_rx, on_throughput.as_deref()));
        let pooled = run_pool(
            &work_items,
            &plan.estimates,
            plan.worker_count,
            &pipeline,
            cancel,
            on_progress.as_mut(),
            |result| aggregator.record(result),
        );
        let _ = stop_tx.send(());
        if monitor_handle.join().is_err() {
            debug!("Throughput monitor thread panicked");
        }
        pooled
    });
    pooled?;

    let summary = aggregator.into_summary();
    let elapsed = started.elapsed();
    info!(
        "Processed {} items in {:.2?}: {} ok, {} failed, {} cancelled",
        summary.total, elapsed, summary.succeeded, summary.failed, summary.cancelled
    );
    let cancelled = summary.cancelled > 0;
    Ok(RunOutcome::Finished(RunReport {
        plan,
        summary,
        elapsed,
        throughput_bytes_per_sec: monitor.rate(),
        cancelled,
        cancel_requested: cancel.is_cancelled(),
    }))
}
