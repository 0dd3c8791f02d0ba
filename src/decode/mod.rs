//! Decode collaborator: item metadata plus on-demand access to XY coordinates.

use anyhow::Result;

use crate::{ItemMetadata, WorkItem};

mod header;
mod las;
mod points;
mod vlr;

pub use header::{LasHeader, parse_header};
pub use las::LasDecoder;
pub use points::LasPoints;
pub use vlr::{CrsDetails, Vlr, epsg_from_text, resolve_crs, units_from_text};

/// Turns a work item into structured metadata and exposes its coordinates for heavy computation.
///
/// Errors (and panics) are isolated to the item: the pipeline records them as `DecodeError`.
pub trait Decoder: Send + Sync {
    fn decode(&self, item: &WorkItem) -> Result<ItemMetadata>;

    /// Random-access view of the item's XY coordinates. Must not load the whole point set.
    fn open_points(&self, item: &WorkItem, metadata: &ItemMetadata)
    -> Result<Box<dyn PointSource>>;
}

/// Indexed XY coordinates. Stride sampling reads only the elements it keeps.
pub trait PointSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates of element `index`, or `None` past the end.
    fn xy(&self, index: usize) -> Option<[f64; 2]>;
}

impl PointSource for [[f64; 2]] {
    fn len(&self) -> usize {
        <[[f64; 2]]>::len(self)
    }

    fn xy(&self, index: usize) -> Option<[f64; 2]> {
        self.get(index).copied()
    }
}

impl PointSource for Vec<[f64; 2]> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn xy(&self, index: usize) -> Option<[f64; 2]> {
        self.get(index).copied()
    }
}
