//! Default [`Decoder`] for uncompressed LAS files.

use anyhow::{Context, Result, bail};
use log::debug;
use std::fs::File;
use std::io::Read;

use super::header::{MAX_HEADER_LEN, parse_header};
use super::points::LasPoints;
use super::vlr::{read_vlrs, resolve_crs};
use super::{Decoder, PointSource};
use crate::{ItemMetadata, WorkItem};

#[derive(Clone, Copy, Debug, Default)]
pub struct LasDecoder;

impl Decoder for LasDecoder {
    fn decode(&self, item: &WorkItem) -> Result<ItemMetadata> {
        let mut file =
            File::open(&item.path).with_context(|| format!("open {}", item.path.display()))?;
        let file_len = file.metadata()?.len();

        let mut buf = Vec::with_capacity(MAX_HEADER_LEN);
        (&mut file)
            .take(MAX_HEADER_LEN as u64)
            .read_to_end(&mut buf)
            .with_context(|| format!("read header of {}", item.path.display()))?;
        let header = parse_header(&buf)?;

        let data_end = header
            .point_data_len()
            .and_then(|n| n.checked_add(u64::from(header.offset_to_point_data)));
        match data_end {
            _ if header.is_compressed() => {}
            Some(end) if end <= file_len => {}
            _ => bail!(
                "point data truncated: header declares {} records of {} bytes after offset {}, file is {} bytes",
                header.point_count,
                header.point_record_length,
                header.offset_to_point_data,
                file_len
            ),
        }

        let vlrs = read_vlrs(&mut file, &header);
        let crs = resolve_crs(&vlrs);
        debug!(
            "{}: LAS {}.{} format {} ({} points, {} VLRs, units {:?}, EPSG {:?})",
            item.id,
            header.version_major,
            header.version_minor,
            header.point_format(),
            header.point_count,
            vlrs.len(),
            crs.units,
            crs.epsg
        );
        Ok(header.into_metadata(crs))
    }

    fn open_points(
        &self,
        item: &WorkItem,
        metadata: &ItemMetadata,
    ) -> Result<Box<dyn PointSource>> {
        if metadata.point_count == 0 {
            return Ok(Box::new(Vec::<[f64; 2]>::new()));
        }
        if metadata.compressed {
            bail!("compressed point data (LAZ) cannot be sampled");
        }
        Ok(Box::new(LasPoints::open(&item.path, metadata)?))
    }
}
