//! Worker pool: a pre-filled job queue drained by `worker_count` threads, results collected on
//! the caller's thread.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

use crate::error::ItemError;
use crate::pipeline::item::panic_message;
use crate::pipeline::{CancellationToken, ItemPipeline};
use crate::{Outcome, PipelineState, ProcessingResult, ResourceEstimate, WorkItem};

use super::hooks::{Progress, ProgressFn};

/// Run `pipeline` over every item with `worker_count` workers.
///
/// Each item yields exactly one result. Items dequeued after cancellation are reported
/// `Cancelled` without starting. `on_progress` fires once per result on this thread, then the
/// result is handed to `sink`.
pub fn run_pool(
    items: &[WorkItem],
    estimates: &[ResourceEstimate],
    worker_count: usize,
    pipeline: &ItemPipeline<'_>,
    cancel: &CancellationToken,
    mut on_progress: Option<&mut ProgressFn<'_>>,
    mut sink: impl FnMut(ProcessingResult),
) -> Result<()> {
    let total = items.len();
    if total == 0 {
        return Ok(());
    }
    // Capacity == item count: queue fill and result sends never block.
    let (job_tx, job_rx) = bounded::<usize>(total);
    for index in 0..total {
        job_tx.send(index)?;
    }
    drop(job_tx);
    let (result_tx, result_rx) = bounded::<ProcessingResult>(total);

    thread::scope(|s| {
        let mut spawned = 0usize;
        for worker_id in 0..worker_count.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let spawn = thread::Builder::new()
                .name(format!("lasbatch-worker-{worker_id}"))
                .spawn_scoped(s, move || {
                    worker_loop(items, estimates, job_rx, result_tx, pipeline, cancel)
                });
            match spawn {
                Ok(_) => spawned += 1,
                Err(e) => warn!("Could not spawn worker {worker_id}: {e}"),
            }
        }
        if spawned == 0 {
            warn!("No worker threads available; processing on the calling thread");
            worker_loop(items, estimates, job_rx.clone(), result_tx.clone(), pipeline, cancel);
        }
        debug!("{} workers draining {} items", spawned.max(1), total);
        drop(result_tx);

        let mut completed = 0usize;
        for result in result_rx.iter() {
            completed += 1;
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(Progress {
                    completed,
                    total,
                    item_id: &result.id,
                });
            }
            sink(result);
        }
    });
    Ok(())
}

fn worker_loop(
    items: &[WorkItem],
    estimates: &[ResourceEstimate],
    job_rx: Receiver<usize>,
    result_tx: Sender<ProcessingResult>,
    pipeline: &ItemPipeline<'_>,
    cancel: &CancellationToken,
) {
    while let Ok(index) = job_rx.recv() {
        let Some(item) = items.get(index) else {
            continue;
        };
        let result = if cancel.is_cancelled() {
            ProcessingResult::not_started(item)
        } else {
            let planned = estimates.get(index).copied().unwrap_or(ResourceEstimate {
                estimated_need_bytes: 0,
                decimation: 1.0,
                constrained: false,
            });
            run_isolated(pipeline, item, &planned)
        };
        if result_tx.send(result).is_err() {
            break;
        }
    }
}

/// Run one item; a panic anywhere in the pipeline becomes a `Panicked` failure.
fn run_isolated(
    pipeline: &ItemPipeline<'_>,
    item: &WorkItem,
    planned: &ResourceEstimate,
) -> ProcessingResult {
    let started = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(item, planned))) {
        Ok(result) => result,
        Err(payload) => {
            let error = ItemError::Panicked {
                message: panic_message(payload.as_ref()),
            };
            warn!("{}: {}", item.id, error);
            ProcessingResult {
                id: item.id.clone(),
                path: item.path.clone(),
                size_bytes: item.size_bytes,
                outcome: Outcome::Failed { error },
                last_state: PipelineState::Queued,
                elapsed: started.elapsed(),
                decimation_used: None,
            }
        }
    }
}
