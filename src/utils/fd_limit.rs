//! File descriptor limit detection for capping the worker pool (Unix).

/// Descriptors one pipeline may hold at once (item file, its mapping, report/log headroom).
pub const FDS_PER_WORKER: usize = 4;

/// Fraction of the process FD limit the pool may claim.
const FD_LIMIT_FRACTION: f64 = 0.8;

/// Returns the soft limit for max open file descriptors, or `None` if unavailable (e.g. Windows).
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let rlim = unsafe { rlim.assume_init() };
    let cur = rlim.rlim_cur;
    // RLIM_INFINITY: no practical limit
    if cur == libc::RLIM_INFINITY || cur > i64::MAX as u64 {
        return None;
    }
    Some(cur)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Largest pool that stays under ~80% of the FD limit. `None` when no limit is known.
pub fn max_workers_by_fd_limit() -> Option<usize> {
    workers_for_fd_limit(max_open_fds()?)
}

/// Pool size allowed by an explicit descriptor limit (never below 1).
pub fn workers_for_fd_limit(limit: u64) -> Option<usize> {
    let usable = (limit as f64 * FD_LIMIT_FRACTION) as usize;
    if usable < FDS_PER_WORKER {
        return Some(1);
    }
    Some(usable / FDS_PER_WORKER)
}
