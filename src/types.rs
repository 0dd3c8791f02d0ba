//! Public types for the batch engine: work items, estimates, plans, per-item results.

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ItemError, PlanError};
use crate::utils::config::{EstimatorConsts, MonitorConsts, UnitConsts, WorkerLimits};

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn serialize_opt_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Horizontal unit of an item's coordinate reference system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrsUnits {
    Meters,
    Feet,
    UsSurveyFeet,
    #[default]
    Unknown,
}

impl CrsUnits {
    /// Length of one coordinate unit in metres. Unknown units are treated as metres.
    pub fn meters_per_unit(self) -> f64 {
        match self {
            CrsUnits::Feet => UnitConsts::FOOT_TO_METERS,
            CrsUnits::UsSurveyFeet => UnitConsts::US_SURVEY_FOOT_TO_METERS,
            CrsUnits::Meters | CrsUnits::Unknown => 1.0,
        }
    }

    /// Convert an area in squared native units to square metres.
    pub fn to_square_meters(self, area: f64) -> f64 {
        let m = self.meters_per_unit();
        area * m * m
    }
}

/// Axis-aligned XYZ bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bounds3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Planimetric (XY) extent area in squared native units.
    pub fn extent_area(&self) -> f64 {
        (self.max[0] - self.min[0]).abs() * (self.max[1] - self.min[1]).abs()
    }

    pub fn union(&self, other: &Bounds3) -> Bounds3 {
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }
}

/// Header-level metadata produced by a [`Decoder`](crate::decode::Decoder).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemMetadata {
    pub version: (u8, u8),
    pub system_identifier: String,
    pub generating_software: String,
    /// Point data format id with compression bits masked off.
    pub point_format: u8,
    /// Point records are compressed (LAZ) and cannot be read in place.
    pub compressed: bool,
    pub point_record_length: u16,
    pub point_count: u64,
    pub offset_to_point_data: u32,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounds: Bounds3,
    pub crs_units: CrsUnits,
    /// Human-readable CRS description (GeoAscii / WKT text), empty if none.
    pub crs_info: String,
    /// Primary CRS name: leading GeoAscii segment, else the outer WKT name.
    pub crs_name: Option<String>,
    /// `ProjectedCSTypeGeoKey`, else the first `"EPSG","NNNN"` in the CRS text.
    pub epsg: Option<u32>,
}

/// One file submitted to the batch. Immutable after enumeration.
#[derive(Clone, Debug, Serialize)]
pub struct WorkItem {
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Pre-decoded metadata; when present the pipeline skips the decode collaborator.
    #[serde(skip)]
    pub metadata: Option<ItemMetadata>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            size_bytes,
            metadata: None,
        }
    }

    /// Build from a file on disk: id is the file name, size from `fs::metadata`.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(id, path, size))
    }

    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Per-item memory need and the decimation that keeps it inside its share of the budget.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResourceEstimate {
    pub estimated_need_bytes: u64,
    /// Fraction of points kept for heavy computation, in `(0, 1]`.
    pub decimation: f64,
    /// True when the estimate was forced to the minimum by constrained mode.
    pub constrained: bool,
}

/// Light runs decode metadata only; heavy runs also compute a footprint hull.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Light,
    Heavy,
}

impl RunMode {
    pub fn from_heavy(heavy: bool) -> Self {
        if heavy { RunMode::Heavy } else { RunMode::Light }
    }

    pub fn is_heavy(self) -> bool {
        matches!(self, RunMode::Heavy)
    }
}

/// Worker count and memory plan shown to the caller before any item runs.
#[derive(Clone, Debug, Serialize)]
pub struct CapacityPlan {
    pub mode: RunMode,
    pub item_count: usize,
    pub total_size_bytes: u64,
    pub available_memory_bytes: u64,
    /// `available × safety_fraction`.
    pub safety_budget_bytes: u64,
    pub average_need_bytes: u64,
    /// Fixed baseline for the mode before any downward revision.
    pub baseline_workers: usize,
    pub worker_count: usize,
    /// `worker_count × average_need`.
    pub estimated_peak_bytes: u64,
    /// `available / estimated_peak`; infinite for an all-empty batch.
    pub headroom: f64,
    /// Headroom below 1.0: concurrent items will not fit in available memory.
    pub warning: bool,
    /// Peak exceeds the safety budget even at the reduced worker count.
    pub exceeds_budget: bool,
    /// Available memory is below the constrained-mode threshold.
    pub constrained: bool,
    /// One estimate per work item, in submission order.
    pub estimates: Vec<ResourceEstimate>,
}

/// Pipeline states for one item. The last three are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Queued,
    SizeValidated,
    MetadataDecoded,
    HeavyComputed,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Failed | PipelineState::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FootprintMethod {
    ConvexHull,
    BoundingExtent,
}

/// Ground footprint from the (decimated) point set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Footprint {
    pub method: FootprintMethod,
    pub area_sq_m: f64,
    pub acres: f64,
    pub vertex_count: usize,
    pub sampled_points: usize,
    /// Hull failed and the bounding extent was used instead.
    pub degraded: bool,
    /// Why the hull was rejected, when degraded.
    pub fallback_reason: Option<String>,
}

/// Metrics extracted from one successfully processed item.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemMetrics {
    pub point_count: u64,
    pub point_format: u8,
    pub version: String,
    pub file_size_bytes: u64,
    pub bounds: Bounds3,
    pub crs_units: CrsUnits,
    pub crs_info: String,
    pub crs_name: Option<String>,
    pub epsg: Option<u32>,
    /// XY extent of the header bounds in square metres.
    pub extent_area_sq_m: f64,
    /// Points per square metre (footprint area when available, else extent area).
    pub point_density: f64,
    pub footprint: Option<Footprint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed { metrics: ItemMetrics },
    Failed { error: ItemError },
    Cancelled,
}

/// Exactly one per submitted [`WorkItem`]; never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Last non-terminal state the item reached (`Queued` if it never started).
    pub last_state: PipelineState,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Decimation applied to the hull input; `None` when no heavy step ran.
    pub decimation_used: Option<f64>,
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Outcome::Cancelled)
    }

    pub fn metrics(&self) -> Option<&ItemMetrics> {
        match &self.outcome {
            Outcome::Completed { metrics } => Some(metrics),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ItemError> {
        match &self.outcome {
            Outcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Terminal state matching the outcome.
    pub fn final_state(&self) -> PipelineState {
        match self.outcome {
            Outcome::Completed { .. } => PipelineState::Completed,
            Outcome::Failed { .. } => PipelineState::Failed,
            Outcome::Cancelled => PipelineState::Cancelled,
        }
    }

    /// Result for an item that was dequeued after cancellation and never started.
    pub fn not_started(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            path: item.path.clone(),
            size_bytes: item.size_bytes,
            outcome: Outcome::Cancelled,
            last_state: PipelineState::Queued,
            elapsed: Duration::ZERO,
            decimation_used: None,
        }
    }
}

/// Options for [`run`](crate::run). Defaults come from [`crate::utils::config`].
#[derive(Clone, Debug, Serialize)]
pub struct RunOptions {
    /// Compute the footprint hull per item (memory/CPU heavy).
    pub heavy_computation_enabled: bool,
    /// Hard per-item size ceiling; larger items fail with `Oversize` without being opened.
    pub max_item_size_bytes: u64,
    /// Fraction of available memory the plan may use.
    pub memory_safety_fraction: f64,
    /// Below this much available memory the run is in constrained mode.
    pub constrained_mode_threshold_bytes: u64,
    /// Estimated working memory as a multiple of file size.
    pub size_multiplier: f64,
    /// Decimation forced in constrained mode and floor for all estimates.
    pub min_decimation: f64,
    pub max_workers_light: usize,
    pub max_workers_heavy: usize,
    /// Optional wall-clock ceiling per item. Enforced at checkpoints and while waiting on the
    /// decode and hull collaborators.
    #[serde(serialize_with = "serialize_opt_secs")]
    pub item_timeout: Option<Duration>,
    #[serde(serialize_with = "serialize_secs")]
    pub monitor_interval: Duration,
    pub monitor_window: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        let limits = WorkerLimits::default();
        Self {
            heavy_computation_enabled: false,
            max_item_size_bytes: EstimatorConsts::MAX_ITEM_SIZE_BYTES,
            memory_safety_fraction: EstimatorConsts::SAFETY_FRACTION,
            constrained_mode_threshold_bytes: EstimatorConsts::CONSTRAINED_THRESHOLD_BYTES,
            size_multiplier: EstimatorConsts::SIZE_MULTIPLIER,
            min_decimation: EstimatorConsts::MIN_DECIMATION,
            max_workers_light: limits.light_max,
            max_workers_heavy: limits.heavy_max,
            item_timeout: None,
            monitor_interval: MonitorConsts::SAMPLE_INTERVAL,
            monitor_window: MonitorConsts::WINDOW,
        }
    }
}

impl RunOptions {
    pub fn mode(&self) -> RunMode {
        RunMode::from_heavy(self.heavy_computation_enabled)
    }

    /// Baseline (and maximum) worker count for the run's mode.
    pub fn max_workers(&self) -> usize {
        match self.mode() {
            RunMode::Light => self.max_workers_light,
            RunMode::Heavy => self.max_workers_heavy,
        }
    }

    /// Reject values that would break the estimator or planner invariants.
    pub fn validate(&self) -> Result<(), PlanError> {
        let invalid = |msg: String| Err(PlanError::InvalidOptions(msg));
        if !(self.memory_safety_fraction > 0.0 && self.memory_safety_fraction <= 1.0) {
            return invalid(format!(
                "memory_safety_fraction must be in (0, 1], got {}",
                self.memory_safety_fraction
            ));
        }
        if !(self.min_decimation > 0.0 && self.min_decimation <= 1.0) {
            return invalid(format!(
                "min_decimation must be in (0, 1], got {}",
                self.min_decimation
            ));
        }
        if !(self.size_multiplier.is_finite() && self.size_multiplier > 0.0) {
            return invalid(format!(
                "size_multiplier must be positive, got {}",
                self.size_multiplier
            ));
        }
        if self.max_workers_light == 0 || self.max_workers_heavy == 0 {
            return invalid("worker maximums must be at least 1".to_string());
        }
        if self.monitor_window == 0 {
            return invalid("monitor_window must be at least 1".to_string());
        }
        if self.monitor_interval.is_zero() {
            return invalid("monitor_interval must be non-zero".to_string());
        }
        Ok(())
    }
}
