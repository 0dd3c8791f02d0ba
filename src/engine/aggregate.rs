//! Result aggregator: folds per-item results into batch totals as they arrive.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use crate::{Bounds3, ProcessingResult};

/// Batch totals. Numeric totals count successes only; `mean_density()` is 0.0 with no successes
/// and min/max density and combined bounds are `None`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AggregateSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_points: u64,
    pub total_bytes: u64,
    pub total_acres: f64,
    pub density_sum: f64,
    pub min_density: Option<f64>,
    pub max_density: Option<f64>,
    pub bounds: Option<Bounds3>,
    /// Successes whose footprint fell back to the bounding extent.
    pub degraded: usize,
    /// Distinct primary CRS names across successes.
    pub crs_names: BTreeSet<String>,
    pub epsg_codes: BTreeSet<u32>,
    /// Every result in arrival order.
    #[serde(skip)]
    pub results: Vec<ProcessingResult>,
}

impl AggregateSummary {
    /// Fold one result in. Counts must always satisfy `succeeded + failed + cancelled == total`.
    pub fn fold(&mut self, result: ProcessingResult) {
        self.total += 1;
        if let Some(m) = result.metrics() {
            self.succeeded += 1;
            self.total_points += m.point_count;
            self.total_bytes += result.size_bytes;
            self.density_sum += m.point_density;
            let d = m.point_density;
            self.min_density = Some(self.min_density.map_or(d, |lo| lo.min(d)));
            self.max_density = Some(self.max_density.map_or(d, |hi| hi.max(d)));
            self.bounds = Some(match self.bounds {
                Some(b) => b.union(&m.bounds),
                None => m.bounds,
            });
            if let Some(name) = &m.crs_name {
                self.crs_names.insert(name.clone());
            }
            self.epsg_codes.extend(m.epsg);
            if let Some(fp) = &m.footprint {
                self.total_acres += fp.acres;
                if fp.degraded {
                    self.degraded += 1;
                }
            }
        } else if result.is_failure() {
            self.failed += 1;
        } else {
            self.cancelled += 1;
        }
        self.results.push(result);
    }

    pub fn mean_density(&self) -> f64 {
        if self.succeeded == 0 {
            0.0
        } else {
            self.density_sum / self.succeeded as f64
        }
    }

    /// Failed items per error kind.
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut by_kind = BTreeMap::new();
        for err in self.results.iter().filter_map(|r| r.error()) {
            *by_kind.entry(err.kind()).or_insert(0) += 1;
        }
        by_kind
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }
}

/// Thread-safe sink shared by the collector.
#[derive(Debug, Default)]
pub struct Aggregator {
    inner: Mutex<AggregateSummary>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: ProcessingResult) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fold(result);
    }

    /// Copy of the totals so far.
    pub fn snapshot(&self) -> AggregateSummary {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_summary(self) -> AggregateSummary {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
