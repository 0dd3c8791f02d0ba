//! CLI command handler: enumerate, plan, confirm, run, report.

use anyhow::{Result, bail};
use kdam::Animation;
use log::{debug, warn};
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::engine::arg_parser::Cli;
use crate::engine::core::{Collaborators, RunOutcome};
use crate::engine::hooks::RunHooks;
use crate::engine::progress::{
    ProgressBarConfig, create_progress_bar, finish_bar, set_bar_position, set_bar_throughput,
};
use crate::engine::report::{print_plan, print_summary, write_report};
use crate::enumerate::{find_las_files, single_file};
use crate::pipeline::CancellationToken;
use crate::utils::batch_toml::{apply_file_to_opts, gb_to_bytes, load_batch_toml};
use crate::utils::setup_logging;
use crate::{CapacityPlan, RunOptions};

/// Defaults, then `.lasbatch.toml` in the base dir, then flags. Returns options, verbosity and the
/// report path from the file.
fn setup_opts(cli: &Cli) -> (RunOptions, bool, Option<String>) {
    let mut opts = RunOptions::default();
    let file = load_batch_toml(&cli.base_dir());
    let mut verbose = false;
    let mut report = None;
    if let Some(file) = &file {
        apply_file_to_opts(file, &mut opts);
        verbose = file.settings.verbose.unwrap_or(false);
        report = file.settings.report.clone();
    }
    if let Some(heavy) = cli.heavy {
        opts.heavy_computation_enabled = heavy;
    }
    if let Some(gb) = cli.max_item_size_gb {
        opts.max_item_size_bytes = gb_to_bytes(gb);
    }
    if let Some(f) = cli.safety_fraction {
        opts.memory_safety_fraction = f;
    }
    if let Some(secs) = cli.timeout_secs {
        opts.item_timeout = Some(Duration::from_secs(secs));
    }
    (opts, cli.verbose.unwrap_or(verbose), report)
}

/// Print the plan and ask on stdin. Anything but y/yes declines.
fn prompt_confirm(plan: &CapacityPlan) -> bool {
    print_plan(plan);
    print!("Proceed? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn collect_items(cli: &Cli) -> Result<Vec<crate::WorkItem>> {
    match &cli.file {
        Some(path) => Ok(vec![single_file(path)?]),
        None => find_las_files(&cli.dir),
    }
}

/// Run one batch from the command line. Errors when declined, cancelled, or every item failed.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, verbose, report_from_file) = setup_opts(cli);
    setup_logging(verbose);

    let items = collect_items(cli)?;
    if items.is_empty() {
        bail!("no .las files found in {}", cli.dir.display());
    }
    let report_path = cli.report_path(report_from_file.as_deref());

    let cancel = CancellationToken::new();
    let flag = cancel.flag();
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, std::sync::atomic::Ordering::Release);
    }) {
        warn!("Could not install Ctrl+C handler: {e}");
    }

    let bar = create_progress_bar(ProgressBarConfig::new(
        items.len(),
        "Processing",
        Animation::Classic,
    ));
    let bar_progress = bar.clone();
    let bar_rate = bar.clone();
    let auto_yes = cli.yes;
    let hooks = RunHooks::new(move |plan| {
        if auto_yes {
            print_plan(plan);
            true
        } else {
            prompt_confirm(plan)
        }
    })
    .on_progress(move |p| set_bar_position(&bar_progress, p.completed))
    .on_sub_progress(|s| debug!("{}: {}", s.item_id, s.stage))
    .on_throughput(move |rate| set_bar_throughput(&bar_rate, rate));

    let collaborators = Collaborators::system()?;
    let outcome = crate::run(items, &opts, &collaborators, &cancel, hooks)?;
    let report = match outcome {
        RunOutcome::Declined(_) => bail!("run declined at preflight"),
        RunOutcome::Finished(report) => report,
    };
    finish_bar(&bar);

    write_report(&report_path, &report, &opts)?;
    print_summary(&report);

    if report.cancelled {
        bail!("run cancelled; partial results written to {}", report_path.display());
    }
    if report.summary.succeeded == 0 {
        bail!("all {} items failed", report.summary.total);
    }
    Ok(())
}
