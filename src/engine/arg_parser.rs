use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Memory-aware batch processor for LAS point-cloud files.
#[derive(Clone, Debug, Parser)]
#[command(name = "lasbatch")]
#[command(about = "Plan, confirm and process a batch of LAS files; writes a JSON report.")]
pub struct Cli {
    /// Directory of .las files (non-recursive). Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Process a single file instead of scanning DIR.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Compute the footprint hull per item (memory heavy; fewer workers).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub heavy: Option<bool>,

    /// Skip the preflight prompt and run the proposed plan.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Hard per-item size ceiling in GiB.
    #[arg(long, value_parser = clap::value_parser!(f64))]
    pub max_item_size_gb: Option<f64>,

    /// Fraction of available memory the plan may use, in (0, 1].
    #[arg(long, value_parser = clap::value_parser!(f64))]
    pub safety_fraction: Option<f64>,

    /// Per-item wall-clock limit in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64))]
    pub timeout_secs: Option<u64>,

    /// Report path. Default: `lasbatch-report.json` in DIR.
    #[arg(long, short)]
    pub report: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl Cli {
    /// Directory holding the config file and the default report.
    pub fn base_dir(&self) -> PathBuf {
        match &self.file {
            Some(f) => f
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DefaultArgs::DIR)),
            None => self.dir.clone(),
        }
    }

    /// Report path from the flag, else the given config value, else the package default in the base dir.
    pub fn report_path(&self, from_file: Option<&str>) -> PathBuf {
        self.report
            .clone()
            .or_else(|| from_file.map(PathBuf::from))
            .unwrap_or_else(|| self.base_dir().join(PackagePaths::get().report_filename()))
    }
}
