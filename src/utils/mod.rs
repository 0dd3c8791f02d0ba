pub mod batch_toml;
pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod tempfiles;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, max_open_fds, max_workers_by_fd_limit, workers_for_fd_limit};
pub use logger::setup_logging;
pub use tempfiles::write_atomic;
