//! Progress bar utilities for the CLI (kdam).

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation,
        unit = " files"
    )))
}

/// Move the bar to `completed`. Blocks on the lock so the final position is never dropped.
pub fn set_bar_position(pb: &ProgressBar, completed: usize) {
    if let Ok(mut bar) = pb.lock() {
        let delta = completed.saturating_sub(bar.counter);
        if delta > 0 {
            let _ = bar.update(delta);
        }
    }
}

/// Show the smoothed read rate as the bar postfix. Skipped when the bar is busy.
pub fn set_bar_throughput(pb: &ProgressBar, bytes_per_sec: f64) {
    if let Ok(mut bar) = pb.try_lock() {
        bar.set_postfix(format!("{:.1} MB/s", bytes_per_sec / 1_000_000.0));
        let _ = bar.refresh();
    }
}

/// Final refresh and newline so later output starts on a clean line.
pub fn finish_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.lock() {
        let _ = bar.refresh();
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn position_update_waits_for_busy_bar() {
        let pb = create_progress_bar(ProgressBarConfig::new(3, "test", Animation::Classic));
        let holder = Arc::clone(&pb);
        let (locked_tx, locked_rx) = crossbeam_channel::bounded(0);
        let busy = thread::spawn(move || {
            let _guard = holder.lock().unwrap();
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(30));
        });
        locked_rx.recv().unwrap();
        set_bar_position(&pb, 3);
        busy.join().unwrap();
        assert_eq!(pb.lock().unwrap().counter, 3);
    }

    #[test]
    fn position_never_moves_backwards() {
        let pb = create_progress_bar(ProgressBarConfig::new(5, "test", Animation::Classic));
        set_bar_position(&pb, 4);
        set_bar_position(&pb, 2);
        assert_eq!(pb.lock().unwrap().counter, 4);
    }
}
