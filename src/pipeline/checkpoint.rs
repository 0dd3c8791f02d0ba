//! Cooperative cancellation: a shared write-once flag and per-item checkpoints.

use crossbeam_channel::{RecvTimeoutError, bounded};
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ItemError;

/// Write-once stop flag shared by the caller, the scheduler and every worker.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns true if this call was the one that set the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// The underlying flag, for handlers such as `ctrlc` that need an `Arc<AtomicBool>`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Checked between pipeline stages and periodically inside long loops.
pub struct Checkpoint<'a> {
    cancel: &'a CancellationToken,
    started: Instant,
    limit: Option<Duration>,
}

impl<'a> Checkpoint<'a> {
    pub fn new(cancel: &'a CancellationToken, limit: Option<Duration>) -> Self {
        Self {
            cancel,
            started: Instant::now(),
            limit,
        }
    }

    pub fn check(&self) -> Result<(), ItemError> {
        if self.cancel.is_cancelled() {
            return Err(ItemError::Cancelled);
        }
        if let Some(limit) = self.limit
            && self.started.elapsed() > limit
        {
            return Err(ItemError::Timeout { limit });
        }
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the item's limit, `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.elapsed()))
    }

    /// Run one collaborator call, catching panics.
    ///
    /// Without a limit the call runs inline. With one it runs on a helper thread and the item
    /// gives up at the deadline with `Timeout`; the helper is detached and its result dropped.
    pub fn call<T, F>(&self, what: &str, work: F) -> Result<thread::Result<T>, ItemError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (Some(limit), Some(remaining)) = (self.limit, self.remaining()) else {
            return Ok(panic::catch_unwind(AssertUnwindSafe(work)));
        };
        if remaining.is_zero() {
            return Err(ItemError::Timeout { limit });
        }
        let (tx, rx) = bounded(1);
        let spawned = thread::Builder::new()
            .name(format!("lasbatch-{what}"))
            .spawn(move || {
                let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(work)));
            });
        if let Err(e) = spawned {
            warn!("Could not spawn {what} helper: {e}");
            return Err(ItemError::Panicked {
                message: format!("{what} helper thread unavailable: {e}"),
            });
        }
        match rx.recv_timeout(remaining) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => {
                debug!("{what} still running at the {limit:?} limit; abandoning it");
                Err(ItemError::Timeout { limit })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ItemError::Panicked {
                message: format!("{what} helper exited without a result"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_write_once() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        assert!(token.cancel());
        assert!(!clone.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn checkpoint_reports_cancel_before_timeout() {
        let token = CancellationToken::new();
        let cp = Checkpoint::new(&token, Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(cp.check(), Err(ItemError::Timeout { .. })));
        token.cancel();
        assert_eq!(cp.check(), Err(ItemError::Cancelled));
    }

    #[test]
    fn call_returns_before_deadline() {
        let token = CancellationToken::new();
        let cp = Checkpoint::new(&token, Some(Duration::from_secs(5)));
        assert_eq!(cp.call("quick", || 7).unwrap().ok(), Some(7));
    }

    #[test]
    fn call_abandons_work_at_deadline() {
        let token = CancellationToken::new();
        let cp = Checkpoint::new(&token, Some(Duration::from_millis(30)));
        let started = Instant::now();
        let res = cp.call("stuck", || thread::sleep(Duration::from_secs(3)));
        assert!(matches!(res, Err(ItemError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn call_catches_panics_inline_and_on_helper() {
        let token = CancellationToken::new();
        let inline = Checkpoint::new(&token, None);
        assert!(inline.call("boom", || -> u8 { panic!("inline") }).unwrap().is_err());
        let bounded = Checkpoint::new(&token, Some(Duration::from_secs(5)));
        assert!(bounded.call("boom", || -> u8 { panic!("helper") }).unwrap().is_err());
    }

    #[test]
    fn no_limit_never_times_out() {
        let token = CancellationToken::new();
        let cp = Checkpoint::new(&token, None);
        assert!(cp.check().is_ok());
    }
}
