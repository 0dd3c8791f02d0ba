//! Deterministic stride decimation of the hull input.

use crate::decode::PointSource;
use crate::error::ItemError;
use crate::utils::config::PipelineConsts;

use super::checkpoint::Checkpoint;

/// `max(1, round(1 / decimation))`. Non-positive or non-finite decimation keeps every point.
pub fn stride_for(decimation: f64) -> usize {
    if !(decimation.is_finite() && decimation > 0.0) {
        return 1;
    }
    let stride = (1.0 / decimation).round();
    if stride >= usize::MAX as f64 {
        usize::MAX
    } else {
        (stride as usize).max(1)
    }
}

/// Number of elements kept from `len` at `stride`: exactly `floor(len / stride)`.
pub fn sampled_len(len: usize, stride: usize) -> usize {
    len / stride.max(1)
}

/// Elements at indices `k × stride` for `k` in `0..floor(len / stride)`, in source order.
pub fn stride_sample<T: Copy>(items: &[T], decimation: f64) -> Vec<T> {
    let stride = stride_for(decimation);
    items
        .iter()
        .step_by(stride)
        .take(sampled_len(items.len(), stride))
        .copied()
        .collect()
}

/// Stride-sample XY from a point source, checking `checkpoint` every
/// [`PipelineConsts::SAMPLE_CHECKPOINT_INTERVAL`] kept points.
pub fn sample_points(
    source: &dyn PointSource,
    stride: usize,
    checkpoint: &Checkpoint<'_>,
) -> Result<Vec<[f64; 2]>, ItemError> {
    let stride = stride.max(1);
    let n = sampled_len(source.len(), stride);
    let mut out = Vec::with_capacity(n);
    for k in 0..n {
        if k % PipelineConsts::SAMPLE_CHECKPOINT_INTERVAL == 0 {
            checkpoint.check()?;
        }
        if let Some(p) = source.xy(k * stride) {
            out.push(p);
        }
    }
    Ok(out)
}
