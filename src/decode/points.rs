//! Memory-mapped point records: X/Y are decoded per index, nothing is copied up front.

use anyhow::{Context, Result, bail};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use super::PointSource;
use crate::ItemMetadata;

pub struct LasPoints {
    map: Mmap,
    start: usize,
    record_len: usize,
    count: usize,
    scale: [f64; 3],
    offset: [f64; 3],
}

impl LasPoints {
    /// Map `path` and check that every declared record lies inside the file.
    pub fn open(path: &Path, meta: &ItemMetadata) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        // Read-only mapping; the file is not modified while mapped.
        let map = unsafe { Mmap::map(&file) }
            .with_context(|| format!("memory-map {}", path.display()))?;

        let count = usize::try_from(meta.point_count)
            .context("point count does not fit in memory on this platform")?;
        let record_len = usize::from(meta.point_record_length);
        let start = meta.offset_to_point_data as usize;
        let end = count
            .checked_mul(record_len)
            .and_then(|n| n.checked_add(start))
            .context("point data length overflows")?;
        if end > map.len() {
            bail!(
                "point data truncated: {} records of {} bytes need {} bytes, file has {}",
                count,
                record_len,
                end,
                map.len()
            );
        }
        Ok(Self {
            map,
            start,
            record_len,
            count,
            scale: meta.scale,
            offset: meta.offset,
        })
    }

    fn raw_i32(&self, at: usize) -> i32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.map[at..at + 4]);
        i32::from_le_bytes(b)
    }
}

impl PointSource for LasPoints {
    fn len(&self) -> usize {
        self.count
    }

    fn xy(&self, index: usize) -> Option<[f64; 2]> {
        if index >= self.count {
            return None;
        }
        let base = self.start + index * self.record_len;
        let x = f64::from(self.raw_i32(base)) * self.scale[0] + self.offset[0];
        let y = f64::from(self.raw_i32(base + 4)) * self.scale[1] + self.offset[1];
        Some([x, y])
    }
}
