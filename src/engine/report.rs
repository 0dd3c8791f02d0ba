//! JSON run report and the terminal summary printed by the CLI.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::utils::tempfiles::write_atomic;
use crate::{CapacityPlan, ProcessingResult, RunOptions};

use super::aggregate::AggregateSummary;
use super::core::RunReport;

/// On-disk shape of the report.
#[derive(Serialize)]
pub struct BatchReport<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub options: &'a RunOptions,
    pub plan: &'a CapacityPlan,
    pub summary: &'a AggregateSummary,
    pub mean_density: f64,
    pub failures_by_kind: BTreeMap<&'static str, usize>,
    pub elapsed_secs: f64,
    pub throughput_bytes_per_sec: f64,
    pub cancelled: bool,
    pub cancel_requested: bool,
    pub results: &'a [ProcessingResult],
}

impl<'a> BatchReport<'a> {
    pub fn new(report: &'a RunReport, options: &'a RunOptions) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            options,
            plan: &report.plan,
            summary: &report.summary,
            mean_density: report.summary.mean_density(),
            failures_by_kind: report.summary.failures_by_kind(),
            elapsed_secs: report.elapsed.as_secs_f64(),
            throughput_bytes_per_sec: report.throughput_bytes_per_sec,
            cancelled: report.cancelled,
            cancel_requested: report.cancel_requested,
            results: report.results(),
        }
    }
}

/// Serialize the report and write it atomically to `path`.
pub fn write_report(path: &Path, report: &RunReport, options: &RunOptions) -> Result<()> {
    let json = serde_json::to_vec_pretty(&BatchReport::new(report, options))
        .context("serialize run report")?;
    write_atomic(path, &json)?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

/// Human-readable plan shown before the preflight prompt.
pub fn print_plan(plan: &CapacityPlan) {
    println!("{}", "Capacity plan".bold());
    println!(
        "  items:            {} ({:.2} GiB)",
        plan.item_count,
        gib(plan.total_size_bytes)
    );
    println!("  mode:             {:?}", plan.mode);
    println!(
        "  workers:          {} (baseline {})",
        plan.worker_count, plan.baseline_workers
    );
    println!(
        "  memory:           {:.2} GiB available, {:.2} GiB budget",
        gib(plan.available_memory_bytes),
        gib(plan.safety_budget_bytes)
    );
    println!(
        "  estimated peak:   {:.2} GiB (headroom {:.2})",
        gib(plan.estimated_peak_bytes),
        plan.headroom
    );
    if plan.constrained {
        println!("  {}", "constrained mode: minimum decimation for all items".yellow());
    }
    if plan.warning {
        println!(
            "  {}",
            "warning: concurrent estimate exceeds available memory".red()
        );
    } else if plan.exceeds_budget {
        println!("  {}", "note: estimated peak exceeds the safety budget".yellow());
    }
}

/// Totals and failures after a run.
pub fn print_summary(report: &RunReport) {
    let s = &report.summary;
    println!();
    println!("{}", "Batch summary".bold());
    println!(
        "  {} ok, {} failed, {} cancelled of {} in {:.2?}",
        s.succeeded.to_string().green(),
        s.failed.to_string().red(),
        s.cancelled.to_string().yellow(),
        s.total,
        report.elapsed
    );
    println!("  points:       {}", s.total_points);
    println!("  bytes:        {:.2} GiB", gib(s.total_bytes));
    if s.total_acres > 0.0 {
        println!("  footprint:    {:.2} acres", s.total_acres);
    }
    println!("  mean density: {:.3} pts/m²", s.mean_density());
    if let (Some(lo), Some(hi)) = (s.min_density, s.max_density) {
        println!("  density:      {lo:.3} .. {hi:.3} pts/m²");
    }
    if !s.epsg_codes.is_empty() {
        let codes: Vec<String> = s.epsg_codes.iter().map(|c| format!("EPSG:{c}")).collect();
        println!("  CRS:          {}", codes.join(", "));
    }
    for name in &s.crs_names {
        println!("                {}", name.dimmed());
    }
    if s.degraded > 0 {
        println!(
            "  {}",
            format!("{} footprint(s) fell back to bounding extent", s.degraded).yellow()
        );
    }
    for r in report.results() {
        if let Some(err) = r.error() {
            println!("  {} {}: {}", "FAILED".red(), r.id, err);
        }
    }
}
