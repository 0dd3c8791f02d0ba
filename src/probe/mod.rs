//! Memory and I/O introspection.
//!
//! The estimator, planner and throughput monitor receive a [`MemoryProbe`] explicitly instead of
//! reading global state. [`SysinfoProbe`] is the system-backed implementation; tests inject fixed
//! readings through the same trait.

use anyhow::Result;

mod system;

pub use system::SysinfoProbe;

/// Read-only view of host memory and this process's cumulative reads.
///
/// Implementations must be callable concurrently from the planner, workers and the monitor
/// thread without external locking.
pub trait MemoryProbe: Send + Sync {
    /// Currently available memory in bytes.
    fn available_memory(&self) -> Result<u64>;

    /// Cumulative bytes read by this process. May reset; callers clamp negative deltas.
    fn process_bytes_read(&self) -> Result<u64>;
}
