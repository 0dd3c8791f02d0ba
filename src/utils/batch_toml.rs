//! Load `.lasbatch.toml` from the scanned directory (CLI only). Library callers build `RunOptions` directly.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::RunOptions;
use crate::utils::config::{PackagePaths, SizeConsts};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BatchToml {
    #[serde(default)]
    pub(crate) settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SettingsSection {
    heavy: Option<bool>,
    max_item_size_gb: Option<f64>,
    safety_fraction: Option<f64>,
    constrained_threshold_gb: Option<f64>,
    size_multiplier: Option<f64>,
    min_decimation: Option<f64>,
    max_workers_light: Option<usize>,
    max_workers_heavy: Option<usize>,
    timeout_secs: Option<u64>,
    monitor_interval_ms: Option<u64>,
    monitor_window: Option<usize>,
    pub(crate) verbose: Option<bool>,
    pub(crate) report: Option<String>,
}

/// Load the config file from `dir` if present. Returns None if missing or unreadable.
pub(crate) fn load_batch_toml(dir: &Path) -> Option<BatchToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_batch_toml(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub(crate) fn parse_batch_toml(s: &str) -> Result<BatchToml, toml::de::Error> {
    toml::from_str(s)
}

pub(crate) fn gb_to_bytes(gb: f64) -> u64 {
    (gb * SizeConsts::GIB as f64) as u64
}

/// Overwrite an options field from the file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file settings to `opts` (only fields present in the file). Call before applying CLI flags.
pub(crate) fn apply_file_to_opts(file: &BatchToml, opts: &mut RunOptions) {
    let s = &file.settings;
    apply_file_opt!(s, opts, heavy => heavy_computation_enabled);
    if let Some(gb) = s.max_item_size_gb {
        opts.max_item_size_bytes = gb_to_bytes(gb);
    }
    apply_file_opt!(s, opts, safety_fraction => memory_safety_fraction);
    if let Some(gb) = s.constrained_threshold_gb {
        opts.constrained_mode_threshold_bytes = gb_to_bytes(gb);
    }
    apply_file_opt!(s, opts, size_multiplier => size_multiplier);
    apply_file_opt!(s, opts, min_decimation => min_decimation);
    apply_file_opt!(s, opts, max_workers_light => max_workers_light);
    apply_file_opt!(s, opts, max_workers_heavy => max_workers_heavy);
    if let Some(secs) = s.timeout_secs {
        opts.item_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(ms) = s.monitor_interval_ms {
        opts.monitor_interval = Duration::from_millis(ms);
    }
    apply_file_opt!(s, opts, monitor_window => monitor_window);
}
