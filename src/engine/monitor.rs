//! Throughput monitor: samples the process's cumulative bytes read and smooths the rate.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::probe::MemoryProbe;

/// One reading of the cumulative read counter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThroughputSample {
    pub at: Instant,
    pub bytes_read: u64,
}

/// Fixed-length ring of instantaneous rates; the smoothed rate is their mean.
#[derive(Debug)]
pub struct RateWindow {
    rates: VecDeque<f64>,
    capacity: usize,
    last: Option<ThroughputSample>,
}

impl RateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rates: VecDeque::with_capacity(capacity),
            capacity,
            last: None,
        }
    }

    /// Add a sample and return the smoothed rate. The first sample only sets the baseline.
    /// A counter that went backwards contributes a zero rate.
    pub fn push(&mut self, sample: ThroughputSample) -> f64 {
        if let Some(prev) = self.last {
            let dt = sample.at.saturating_duration_since(prev.at).as_secs_f64();
            if dt > 0.0 {
                let delta = sample.bytes_read.saturating_sub(prev.bytes_read);
                if self.rates.len() == self.capacity {
                    self.rates.pop_front();
                }
                self.rates.push_back(delta as f64 / dt);
            }
        }
        self.last = Some(sample);
        self.smoothed()
    }

    /// Mean of the buffered rates in bytes per second; 0.0 before two samples exist.
    pub fn smoothed(&self) -> f64 {
        if self.rates.is_empty() {
            return 0.0;
        }
        self.rates.iter().sum::<f64>() / self.rates.len() as f64
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn last_bytes(&self) -> Option<u64> {
        self.last.map(|s| s.bytes_read)
    }
}

/// Runs alongside the scheduler for the life of a run. Read-only with respect to items.
pub struct ThroughputMonitor {
    probe: Arc<dyn MemoryProbe>,
    interval: Duration,
    window: Mutex<RateWindow>,
}

impl ThroughputMonitor {
    pub fn new(probe: Arc<dyn MemoryProbe>, interval: Duration, window: usize) -> Self {
        Self {
            probe,
            interval,
            window: Mutex::new(RateWindow::new(window)),
        }
    }

    /// Take one sample now. A failed probe read counts as a zero-delta sample.
    pub fn sample_once(&self) -> f64 {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes_read = match self.probe.process_bytes_read() {
            Ok(b) => b,
            Err(e) => {
                debug!("Throughput probe failed: {e:#}");
                window.last_bytes().unwrap_or(0)
            }
        };
        window.push(ThroughputSample {
            at: Instant::now(),
            bytes_read,
        })
    }

    /// Current smoothed rate in bytes per second.
    pub fn rate(&self) -> f64 {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .smoothed()
    }

    /// Sample every interval until `stop` receives a message or disconnects.
    pub fn run_until(&self, stop: &Receiver<()>, on_rate: Option<&(dyn Fn(f64) + Send + Sync)>) {
        self.sample_once();
        loop {
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let rate = self.sample_once();
                    if let Some(cb) = on_rate {
                        cb(rate);
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::thread;

    /// Read counter that advances 1 MB per call and can be switched off.
    #[derive(Default)]
    struct FlakyCounter {
        offline: AtomicBool,
        bytes: AtomicU64,
    }

    impl MemoryProbe for FlakyCounter {
        fn available_memory(&self) -> Result<u64> {
            Ok(u64::MAX)
        }

        fn process_bytes_read(&self) -> Result<u64> {
            if self.offline.load(Ordering::SeqCst) {
                bail!("io counters offline");
            }
            Ok(self.bytes.fetch_add(1_000_000, Ordering::SeqCst) + 1_000_000)
        }
    }

    fn sample_after_pause(monitor: &ThroughputMonitor) -> f64 {
        thread::sleep(Duration::from_millis(5));
        monitor.sample_once()
    }

    fn at(base: Instant, ms: u64, bytes: u64) -> ThroughputSample {
        ThroughputSample {
            at: base + Duration::from_millis(ms),
            bytes_read: bytes,
        }
    }

    #[test]
    fn first_sample_sets_baseline_only() {
        let base = Instant::now();
        let mut w = RateWindow::new(10);
        assert_eq!(w.push(at(base, 0, 1_000)), 0.0);
        assert!(w.is_empty());
        let rate = w.push(at(base, 500, 2_000));
        assert!((rate - 2_000.0).abs() < 1e-6);
    }

    #[test]
    fn window_keeps_last_n_rates() {
        let base = Instant::now();
        let mut w = RateWindow::new(3);
        w.push(at(base, 0, 0));
        // rates: 1000, 1000, 1000, 4000, 4000 (per second)
        w.push(at(base, 1_000, 1_000));
        w.push(at(base, 2_000, 2_000));
        w.push(at(base, 3_000, 3_000));
        w.push(at(base, 4_000, 7_000));
        let rate = w.push(at(base, 5_000, 11_000));
        assert_eq!(w.len(), 3);
        assert!((rate - 3_000.0).abs() < 1e-6);
    }

    #[test]
    fn counter_reset_is_zero_rate() {
        let base = Instant::now();
        let mut w = RateWindow::new(10);
        w.push(at(base, 0, 5_000));
        let rate = w.push(at(base, 1_000, 100));
        assert_eq!(rate, 0.0);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn failed_counter_read_is_zero_delta_sample() {
        let probe = Arc::new(FlakyCounter::default());
        probe.offline.store(true, Ordering::SeqCst);
        let monitor = ThroughputMonitor::new(probe.clone(), Duration::from_millis(5), 10);

        monitor.sample_once();
        assert_eq!(sample_after_pause(&monitor), 0.0);
        assert_eq!(sample_after_pause(&monitor), 0.0);
        assert_eq!(monitor.window.lock().unwrap().len(), 2);
        assert_eq!(monitor.rate(), 0.0);

        probe.offline.store(false, Ordering::SeqCst);
        assert!(sample_after_pause(&monitor) > 0.0);
        let window_len = monitor.window.lock().unwrap().len();
        assert_eq!(window_len, 3);
        assert!(monitor.rate() > 0.0);

        // an outage after good reads repeats the last reading
        probe.offline.store(true, Ordering::SeqCst);
        let before = monitor.rate();
        assert!(sample_after_pause(&monitor) < before);
        assert_eq!(monitor.window.lock().unwrap().len(), 4);
    }
}
