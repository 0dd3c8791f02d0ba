//! Geometry-hull collaborator and the planar helpers around it.

use anyhow::{Result, bail};
use rayon::prelude::*;

use crate::utils::config::PipelineConsts;

/// Convex hull in counter-clockwise order with its planar area (squared native units).
#[derive(Clone, Debug, PartialEq)]
pub struct Hull {
    pub vertices: Vec<[f64; 2]>,
    pub area: f64,
}

/// Computes a footprint hull. Fails on degenerate input (too few distinct points, collinear);
/// the pipeline then falls back to the bounding extent.
pub trait HullBuilder: Send + Sync {
    fn hull(&self, points: Vec<[f64; 2]>) -> Result<Hull>;
}

/// Andrew's monotone chain, O(n log n). Large inputs are sorted with rayon.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotoneChainHull;

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn push_chain(chain: &mut Vec<[f64; 2]>, p: [f64; 2]) {
    while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
        chain.pop();
    }
    chain.push(p);
}

impl HullBuilder for MonotoneChainHull {
    fn hull(&self, mut points: Vec<[f64; 2]>) -> Result<Hull> {
        points.retain(|p| p[0].is_finite() && p[1].is_finite());
        let by_xy = |a: &[f64; 2], b: &[f64; 2]| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1]));
        if points.len() >= PipelineConsts::PARALLEL_SORT_THRESHOLD {
            points.par_sort_unstable_by(by_xy);
        } else {
            points.sort_unstable_by(by_xy);
        }
        points.dedup();
        if points.len() < 3 {
            bail!("{} distinct points, need at least 3", points.len());
        }

        let mut lower: Vec<[f64; 2]> = Vec::new();
        for &p in &points {
            push_chain(&mut lower, p);
        }
        let mut upper: Vec<[f64; 2]> = Vec::new();
        for &p in points.iter().rev() {
            push_chain(&mut upper, p);
        }
        lower.pop();
        upper.pop();
        lower.extend(upper);

        let area = polygon_area(&lower);
        if lower.len() < 3 || area <= 0.0 {
            bail!("points are collinear");
        }
        Ok(Hull {
            vertices: lower,
            area,
        })
    }
}

/// Shoelace area of a simple polygon. Zero for fewer than three vertices.
pub fn polygon_area(vertices: &[[f64; 2]]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let n = vertices.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let [x1, y1] = vertices[i];
            let [x2, y2] = vertices[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum();
    twice.abs() / 2.0
}

/// Min/max corners of the finite points, or `None` if there are none.
pub fn xy_extent(points: &[[f64; 2]]) -> Option<([f64; 2], [f64; 2])> {
    points
        .iter()
        .filter(|p| p[0].is_finite() && p[1].is_finite())
        .fold(None, |acc, &p| match acc {
            None => Some((p, p)),
            Some((lo, hi)) => Some((
                [lo[0].min(p[0]), lo[1].min(p[1])],
                [hi[0].max(p[0]), hi[1].max(p[1])],
            )),
        })
}
