//! Per-item pipeline: size check, metadata decode, optional footprint hull.
//!
//! Queued -> SizeValidated -> MetadataDecoded -> [HeavyComputed] -> Completed,
//! or Failed / Cancelled from any non-terminal state. Every error stays inside the item.

use log::{debug, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::decode::Decoder;
use crate::engine::estimator::ResourceEstimator;
use crate::engine::hooks::{SubProgress, SubStage};
use crate::error::ItemError;
use crate::geometry::{HullBuilder, xy_extent};
use crate::utils::config::{PipelineConsts, UnitConsts};
use crate::{
    Footprint, FootprintMethod, ItemMetadata, ItemMetrics, Outcome, PipelineState,
    ProcessingResult, ResourceEstimate, RunOptions, WorkItem,
};

use super::checkpoint::{CancellationToken, Checkpoint};
use super::sampling::{sample_points, stride_for};

/// Collaborators and settings shared by every worker for one run. Decode and hull calls may
/// outlive the item on a helper thread when a time limit is set, so those two are owned.
pub struct ItemPipeline<'a> {
    pub decoder: Arc<dyn Decoder>,
    pub hull: Arc<dyn HullBuilder>,
    pub estimator: &'a ResourceEstimator,
    pub options: &'a RunOptions,
    pub cancel: &'a CancellationToken,
    /// Concurrent executors; the refreshed estimate splits the budget this many ways.
    pub worker_count: usize,
    pub sub_progress: Option<&'a (dyn Fn(SubProgress<'_>) + Send + Sync)>,
}

/// What the item reached before it stopped.
struct Trace {
    state: PipelineState,
    decimation_used: Option<f64>,
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl ItemPipeline<'_> {
    /// Drive one item to a terminal state. `planned` is the item's estimate from the plan,
    /// used when a fresh estimate cannot be taken.
    pub fn process(&self, item: &WorkItem, planned: &ResourceEstimate) -> ProcessingResult {
        let checkpoint = Checkpoint::new(self.cancel, self.options.item_timeout);
        let mut trace = Trace {
            state: PipelineState::Queued,
            decimation_used: None,
        };
        let advanced = panic::catch_unwind(AssertUnwindSafe(|| {
            self.advance(item, planned, &checkpoint, &mut trace)
        }))
        .unwrap_or_else(|payload| {
            Err(ItemError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        });
        let outcome = match advanced {
            Ok(metrics) => Outcome::Completed { metrics },
            Err(ItemError::Cancelled) => Outcome::Cancelled,
            Err(error) => Outcome::Failed { error },
        };
        let elapsed = checkpoint.elapsed();
        match &outcome {
            Outcome::Completed { metrics } => debug!(
                "{}: {} points in {:.2?} ({:.2} pts/m²)",
                item.id, metrics.point_count, elapsed, metrics.point_density
            ),
            Outcome::Failed { error } => warn!("{}: {}", item.id, error),
            Outcome::Cancelled => debug!("{}: cancelled at {:?}", item.id, trace.state),
        }
        ProcessingResult {
            id: item.id.clone(),
            path: item.path.clone(),
            size_bytes: item.size_bytes,
            outcome,
            last_state: trace.state,
            elapsed,
            decimation_used: trace.decimation_used,
        }
    }

    fn advance(
        &self,
        item: &WorkItem,
        planned: &ResourceEstimate,
        checkpoint: &Checkpoint<'_>,
        trace: &mut Trace,
    ) -> Result<ItemMetrics, ItemError> {
        checkpoint.check()?;
        if item.size_bytes > self.options.max_item_size_bytes {
            return Err(ItemError::Oversize {
                size: item.size_bytes,
                limit: self.options.max_item_size_bytes,
            });
        }
        trace.state = PipelineState::SizeValidated;
        checkpoint.check()?;

        let metadata = match &item.metadata {
            Some(m) => m.clone(),
            None => self.decode(item, checkpoint)?,
        };
        trace.state = PipelineState::MetadataDecoded;
        checkpoint.check()?;

        let mut metrics = base_metrics(item, &metadata);
        if self.options.heavy_computation_enabled {
            if item.size_bytes >= PipelineConsts::LARGE_ITEM_LOG_BYTES {
                info!(
                    "{}: computing footprint for {:.1} MiB item",
                    item.id,
                    item.size_bytes as f64 / (1024.0 * 1024.0)
                );
            }
            let footprint = self.footprint(item, &metadata, planned, checkpoint, trace)?;
            if footprint.area_sq_m > 0.0 {
                metrics.point_density = metadata.point_count as f64 / footprint.area_sq_m;
            }
            metrics.footprint = Some(footprint);
            trace.state = PipelineState::HeavyComputed;
            checkpoint.check()?;
        }
        Ok(metrics)
    }

    fn decode(
        &self,
        item: &WorkItem,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<ItemMetadata, ItemError> {
        self.notify(item, SubStage::Decoding);
        let decoder = Arc::clone(&self.decoder);
        let work = item.clone();
        match checkpoint.call("decode", move || decoder.decode(&work))? {
            Ok(Ok(m)) => Ok(m),
            Ok(Err(e)) => Err(ItemError::decode(&e)),
            Err(payload) => Err(ItemError::Decode {
                message: format!("decoder panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    fn footprint(
        &self,
        item: &WorkItem,
        metadata: &ItemMetadata,
        planned: &ResourceEstimate,
        checkpoint: &Checkpoint<'_>,
        trace: &mut Trace,
    ) -> Result<Footprint, ItemError> {
        let decimation = match self.estimator.estimate_shared(item, self.worker_count) {
            Ok(fresh) => fresh.decimation,
            Err(e) => {
                debug!("{}: keeping planned decimation ({e:#})", item.id);
                planned.decimation
            }
        };
        trace.decimation_used = Some(decimation);

        let source = self
            .decoder
            .open_points(item, metadata)
            .map_err(|e| ItemError::decode(&e))?;
        let stride = stride_for(decimation);
        self.notify(
            item,
            SubStage::Sampling {
                stride,
                source_points: source.len(),
            },
        );
        checkpoint.check()?;
        let points = sample_points(source.as_ref(), stride, checkpoint)?;
        drop(source);
        checkpoint.check()?;

        let sampled_points = points.len();
        let extent = xy_extent(&points);
        let units = metadata.crs_units;
        self.notify(
            item,
            SubStage::ComputingHull {
                points: sampled_points,
            },
        );
        let builder = Arc::clone(&self.hull);
        let hull = checkpoint
            .call("hull", move || builder.hull(points))?
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!(
                    "hull builder panicked: {}",
                    panic_message(payload.as_ref())
                ))
            });
        match hull {
            Ok(h) => {
                let area_sq_m = units.to_square_meters(h.area);
                Ok(Footprint {
                    method: FootprintMethod::ConvexHull,
                    area_sq_m,
                    acres: area_sq_m / UnitConsts::SQ_METERS_PER_ACRE,
                    vertex_count: h.vertices.len(),
                    sampled_points,
                    degraded: false,
                    fallback_reason: None,
                })
            }
            Err(e) => {
                let reason = ItemError::GeometryDegenerate {
                    message: format!("{e:#}"),
                };
                warn!("{}: {}; using bounding extent", item.id, reason);
                self.notify(item, SubStage::BoundingExtentFallback);
                let native_area = match extent {
                    Some((lo, hi)) => (hi[0] - lo[0]) * (hi[1] - lo[1]),
                    None => metadata.bounds.extent_area(),
                };
                let area_sq_m = units.to_square_meters(native_area);
                Ok(Footprint {
                    method: FootprintMethod::BoundingExtent,
                    area_sq_m,
                    acres: area_sq_m / UnitConsts::SQ_METERS_PER_ACRE,
                    vertex_count: if area_sq_m > 0.0 { 4 } else { 0 },
                    sampled_points,
                    degraded: true,
                    fallback_reason: Some(reason.to_string()),
                })
            }
        }
    }

    fn notify(&self, item: &WorkItem, stage: SubStage) {
        if let Some(f) = self.sub_progress {
            f(SubProgress {
                item_id: &item.id,
                stage,
            });
        }
    }
}

/// Light-mode metrics straight from the header.
pub fn base_metrics(item: &WorkItem, metadata: &ItemMetadata) -> ItemMetrics {
    let extent_area_sq_m = metadata
        .crs_units
        .to_square_meters(metadata.bounds.extent_area());
    let point_density = if extent_area_sq_m > 0.0 {
        metadata.point_count as f64 / extent_area_sq_m
    } else {
        0.0
    };
    ItemMetrics {
        point_count: metadata.point_count,
        point_format: metadata.point_format,
        version: format!("{}.{}", metadata.version.0, metadata.version.1),
        file_size_bytes: item.size_bytes,
        bounds: metadata.bounds,
        crs_units: metadata.crs_units,
        crs_info: metadata.crs_info.clone(),
        crs_name: metadata.crs_name.clone(),
        epsg: metadata.epsg,
        extent_area_sq_m,
        point_density,
        footprint: None,
    }
}
