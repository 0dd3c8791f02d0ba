//! Per-item pipeline components: cancellation checkpoints, stride sampling, the state machine.

pub mod checkpoint;
pub mod item;
pub mod sampling;

pub use checkpoint::{CancellationToken, Checkpoint};
pub use item::{ItemPipeline, base_metrics};
pub use sampling::{sample_points, sampled_len, stride_for, stride_sample};
