//! Error taxonomy: per-item errors become `Failed` results; plan errors abort the run before any work.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Why one item did not complete. Never unwinds into the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// Size exceeds the hard ceiling; the item was never opened.
    #[error("{size} bytes exceeds the {limit} byte per-item ceiling")]
    Oversize { size: u64, limit: u64 },

    /// Unreadable or malformed contents.
    #[error("decode failed: {message}")]
    Decode { message: String },

    /// Hull input too small or collinear. Recovered by the bounding-extent fallback.
    #[error("degenerate geometry: {message}")]
    GeometryDegenerate { message: String },

    #[error("per-item time limit of {limit:?} exceeded")]
    Timeout { limit: Duration },

    #[error("run cancelled before the item finished")]
    Cancelled,

    /// A collaborator panicked; caught at the worker boundary.
    #[error("pipeline panicked: {message}")]
    Panicked { message: String },
}

impl ItemError {
    /// Stable tag for reports and tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::Oversize { .. } => "oversize",
            ItemError::Decode { .. } => "decode",
            ItemError::GeometryDegenerate { .. } => "geometry_degenerate",
            ItemError::Timeout { .. } => "timeout",
            ItemError::Cancelled => "cancelled",
            ItemError::Panicked { .. } => "panicked",
        }
    }

    pub fn decode(err: &anyhow::Error) -> Self {
        ItemError::Decode {
            message: format!("{err:#}"),
        }
    }
}

/// Failure to build a capacity plan. Surfaced from [`run`](crate::run) before any item starts.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("no work items to process")]
    EmptyBatch,

    #[error("memory introspection unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("invalid run options: {0}")]
    InvalidOptions(String),
}
