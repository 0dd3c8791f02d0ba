//! Resource estimator: per-item memory need and a safe decimation factor, from declared size only.

use anyhow::{Context, Result};
use log::debug;
use std::sync::Arc;

use crate::probe::MemoryProbe;
use crate::{ResourceEstimate, RunOptions, WorkItem};

/// Sizing heuristics taken from [`RunOptions`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorSettings {
    pub size_multiplier: f64,
    pub safety_fraction: f64,
    pub constrained_threshold_bytes: u64,
    pub min_decimation: f64,
}

impl From<&RunOptions> for EstimatorSettings {
    fn from(o: &RunOptions) -> Self {
        Self {
            size_multiplier: o.size_multiplier,
            safety_fraction: o.memory_safety_fraction,
            constrained_threshold_bytes: o.constrained_mode_threshold_bytes,
            min_decimation: o.min_decimation,
        }
    }
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self::from(&RunOptions::default())
    }
}

/// One reading of available memory and whether it puts the run in constrained mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemorySnapshot {
    pub available_bytes: u64,
    pub constrained: bool,
}

/// Estimates are never cached: every call to [`Self::estimate`] reads the probe again.
pub struct ResourceEstimator {
    probe: Arc<dyn MemoryProbe>,
    settings: EstimatorSettings,
}

impl ResourceEstimator {
    pub fn new(probe: Arc<dyn MemoryProbe>, settings: EstimatorSettings) -> Self {
        Self { probe, settings }
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    /// Read available memory now.
    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        let available = self
            .probe
            .available_memory()
            .context("read available memory")?;
        Ok(self.snapshot_from(available))
    }

    pub fn snapshot_from(&self, available_bytes: u64) -> MemorySnapshot {
        MemorySnapshot {
            available_bytes,
            constrained: available_bytes < self.settings.constrained_threshold_bytes,
        }
    }

    /// `available × safety_fraction`.
    pub fn safety_budget(&self, snapshot: &MemorySnapshot) -> u64 {
        (snapshot.available_bytes as f64 * self.settings.safety_fraction) as u64
    }

    /// `size × multiplier`.
    pub fn estimated_need(&self, size_bytes: u64) -> u64 {
        (size_bytes as f64 * self.settings.size_multiplier).ceil() as u64
    }

    /// Estimate for an item of `size_bytes` when `share` executors split the safety budget.
    ///
    /// Decimation is `min(1, (budget / share) / need)`, floored at the minimum decimation;
    /// constrained mode forces the minimum regardless of size.
    pub fn estimate_with(
        &self,
        snapshot: &MemorySnapshot,
        size_bytes: u64,
        share: usize,
    ) -> ResourceEstimate {
        let need = self.estimated_need(size_bytes);
        let min = self.settings.min_decimation;
        let decimation = if snapshot.constrained {
            min
        } else if need == 0 {
            1.0
        } else {
            let per_executor = self.safety_budget(snapshot) as f64 / share.max(1) as f64;
            (per_executor / need as f64).clamp(min, 1.0)
        };
        ResourceEstimate {
            estimated_need_bytes: need,
            decimation,
            constrained: snapshot.constrained,
        }
    }

    /// Fresh standalone estimate (the whole budget is available to this item).
    pub fn estimate(&self, item: &WorkItem) -> Result<ResourceEstimate> {
        self.estimate_shared(item, 1)
    }

    /// Fresh estimate with the budget split across `share` concurrent executors.
    pub fn estimate_shared(&self, item: &WorkItem, share: usize) -> Result<ResourceEstimate> {
        let snapshot = self.snapshot()?;
        let estimate = self.estimate_with(&snapshot, item.size_bytes, share);
        debug!(
            "{}: need {} bytes, decimation {:.4} (available {}, share 1/{})",
            item.id,
            estimate.estimated_need_bytes,
            estimate.decimation,
            snapshot.available_bytes,
            share.max(1)
        );
        Ok(estimate)
    }
}
