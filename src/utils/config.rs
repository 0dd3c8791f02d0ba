//! Application configuration constants.
//! Tuning and thresholds in one place; [`crate::RunOptions::default`] is built from these.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    report_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                report_filename: format!("{pkg}-report.json"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Per-directory config file read by the CLI (e.g. `.lasbatch.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Default JSON report written next to the scanned files.
    pub fn report_filename(&self) -> &str {
        &self.report_filename
    }
}

// ---- Sizes ----

pub struct SizeConsts;

impl SizeConsts {
    pub const MIB: u64 = 1024 * 1024;
    pub const GIB: u64 = 1024 * 1024 * 1024;
}

// ---- Resource estimation ----

/// Empirical sizing heuristics. Defaults only; validate per deployment.
pub struct EstimatorConsts;

impl EstimatorConsts {
    /// Decoded representation plus working buffers, as a multiple of the file size.
    pub const SIZE_MULTIPLIER: f64 = 1.5;
    /// Fraction of available memory the run may plan to use.
    pub const SAFETY_FRACTION: f64 = 0.5;
    /// Below this much available memory every item is forced to [`Self::MIN_DECIMATION`].
    pub const CONSTRAINED_THRESHOLD_BYTES: u64 = 8 * SizeConsts::GIB;
    /// Floor for any decimation factor (keep 1% of points).
    pub const MIN_DECIMATION: f64 = 0.01;
    /// Items larger than this are rejected before any work (hard ceiling).
    pub const MAX_ITEM_SIZE_BYTES: u64 = 20 * SizeConsts::GIB;
}

// ---- Worker threads ----

/// Baseline worker counts per run mode. The planner only ever revises these downward.
#[derive(Clone, Copy, Debug)]
pub struct WorkerLimits {
    /// Metadata-only runs (I/O bound).
    pub light_max: usize,
    /// Runs with hull computation (memory bound).
    pub heavy_max: usize,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            light_max: Self::LIGHT_THREADS,
            heavy_max: Self::HEAVY_THREADS,
        }
    }
}

impl WorkerLimits {
    pub const LIGHT_THREADS: usize = 12;
    pub const HEAVY_THREADS: usize = 4;
}

// ---- Throughput monitor ----

pub struct MonitorConsts;

impl MonitorConsts {
    /// Sampling period of the throughput monitor.
    pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);
    /// Ring buffer length for the smoothed rate.
    pub const WINDOW: usize = 10;
}

// ---- Per-item pipeline ----

pub struct PipelineConsts;

impl PipelineConsts {
    /// Sampled points between cancellation/deadline checks.
    pub const SAMPLE_CHECKPOINT_INTERVAL: usize = 65_536;
    /// Hull inputs at or above this many points are sorted in parallel.
    pub const PARALLEL_SORT_THRESHOLD: usize = 100_000;
    /// Items above this size get an info line when they start.
    pub const LARGE_ITEM_LOG_BYTES: u64 = 1000 * SizeConsts::MIB;
}

// ---- Units ----

pub struct UnitConsts;

impl UnitConsts {
    pub const FOOT_TO_METERS: f64 = 0.3048;
    pub const US_SURVEY_FOOT_TO_METERS: f64 = 0.304_800_609_6;
    pub const SQ_METERS_PER_ACRE: f64 = 4046.856_422_4;
}
