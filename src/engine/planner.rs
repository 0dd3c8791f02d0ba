//! Capacity planner: worker count, peak memory and warnings for the whole batch.

use anyhow::Result;
use log::{debug, info, warn};

use crate::error::PlanError;
use crate::utils::fd_limit::max_workers_by_fd_limit;
use crate::{CapacityPlan, RunOptions, WorkItem};

use super::estimator::ResourceEstimator;

/// Baseline for the mode, revised downward only: to fit `avg_need` per worker inside `budget`,
/// then to the item count and the FD cap. Always at least 1.
pub fn revise_worker_count(
    baseline: usize,
    avg_need: u64,
    budget: u64,
    item_count: usize,
    fd_cap: Option<usize>,
) -> usize {
    let mut workers = baseline.max(1);
    if avg_need > 0 && (workers as u128) * (avg_need as u128) > budget as u128 {
        let fit = usize::try_from(budget / avg_need).unwrap_or(usize::MAX);
        debug!(
            "Reducing workers {} -> {} ({} workers x {} bytes > budget {})",
            workers,
            fit.clamp(1, workers),
            workers,
            avg_need,
            budget
        );
        workers = fit.clamp(1, workers);
    }
    if item_count > 0 {
        workers = workers.min(item_count);
    }
    if let Some(cap) = fd_cap
        && cap < workers
    {
        debug!("Capping workers {} -> {} (FD limit ~80%)", workers, cap);
        workers = cap.max(1);
    }
    workers
}

/// Build the plan for `items`. Fails only when no plan can be made: empty batch, invalid
/// options, or memory introspection unavailable.
pub fn plan_capacity(
    items: &[WorkItem],
    options: &RunOptions,
    estimator: &ResourceEstimator,
) -> Result<CapacityPlan> {
    options.validate()?;
    if items.is_empty() {
        return Err(PlanError::EmptyBatch.into());
    }
    let snapshot = estimator
        .snapshot()
        .map_err(|e| PlanError::MemoryUnavailable(format!("{e:#}")))?;

    let item_count = items.len();
    let total_size_bytes: u64 = items.iter().map(|i| i.size_bytes).sum();
    let total_need: u128 = items
        .iter()
        .map(|i| u128::from(estimator.estimated_need(i.size_bytes)))
        .sum();
    let average_need_bytes = (total_need / item_count as u128) as u64;
    let safety_budget_bytes = estimator.safety_budget(&snapshot);
    let baseline_workers = options.max_workers();

    let worker_count = revise_worker_count(
        baseline_workers,
        average_need_bytes,
        safety_budget_bytes,
        item_count,
        max_workers_by_fd_limit(),
    );
    let estimated_peak_bytes = average_need_bytes.saturating_mul(worker_count as u64);
    let headroom = if estimated_peak_bytes == 0 {
        f64::INFINITY
    } else {
        snapshot.available_bytes as f64 / estimated_peak_bytes as f64
    };

    let estimates = items
        .iter()
        .map(|i| estimator.estimate_with(&snapshot, i.size_bytes, worker_count))
        .collect();

    let plan = CapacityPlan {
        mode: options.mode(),
        item_count,
        total_size_bytes,
        available_memory_bytes: snapshot.available_bytes,
        safety_budget_bytes,
        average_need_bytes,
        baseline_workers,
        worker_count,
        estimated_peak_bytes,
        headroom,
        warning: headroom < 1.0,
        exceeds_budget: estimated_peak_bytes > safety_budget_bytes,
        constrained: snapshot.constrained,
        estimates,
    };

    info!(
        "Plan: {} items ({} bytes), {:?} mode, {} of {} workers, peak ~{} bytes of {} available",
        plan.item_count,
        plan.total_size_bytes,
        plan.mode,
        plan.worker_count,
        plan.baseline_workers,
        plan.estimated_peak_bytes,
        plan.available_memory_bytes
    );
    if plan.constrained {
        warn!(
            "Constrained mode: {} bytes available is below {}; all items use {:.0}% decimation",
            snapshot.available_bytes,
            options.constrained_mode_threshold_bytes,
            options.min_decimation * 100.0
        );
    }
    if plan.warning {
        warn!(
            "Concurrent memory estimate exceeds available memory (headroom {:.2})",
            plan.headroom
        );
    }
    Ok(plan)
}
