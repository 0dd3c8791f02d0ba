//! LAS public header block (versions 1.0 through 1.4).

use anyhow::{Result, anyhow, bail};

use super::vlr::CrsDetails;
use crate::{Bounds3, ItemMetadata};

pub const SIGNATURE: &[u8; 4] = b"LASF";
/// Header length for LAS 1.0–1.2.
pub const MIN_HEADER_LEN: usize = 227;
/// Header length for LAS 1.4 (the largest we read).
pub const MAX_HEADER_LEN: usize = 375;
/// Offset of the 64-bit point count added in 1.4.
const POINT_COUNT_64_AT: usize = 247;
/// Bits 6 and 7 of the format byte flag compressed (LAZ) point data.
pub const COMPRESSION_MASK: u8 = 0xC0;

#[derive(Clone, Debug, PartialEq)]
pub struct LasHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub system_identifier: String,
    pub generating_software: String,
    pub header_size: u16,
    pub offset_to_point_data: u32,
    pub vlr_count: u32,
    /// Raw format byte as stored, compression bits included.
    pub point_format_raw: u8,
    pub point_record_length: u16,
    pub point_count: u64,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounds: Bounds3,
}

impl LasHeader {
    pub fn point_format(&self) -> u8 {
        self.point_format_raw & !COMPRESSION_MASK
    }

    pub fn is_compressed(&self) -> bool {
        self.point_format_raw & COMPRESSION_MASK != 0
    }

    /// Byte length of the point records the header declares.
    pub fn point_data_len(&self) -> Option<u64> {
        self.point_count.checked_mul(u64::from(self.point_record_length))
    }

    pub fn into_metadata(self, crs: CrsDetails) -> ItemMetadata {
        ItemMetadata {
            version: (self.version_major, self.version_minor),
            point_format: self.point_format(),
            compressed: self.is_compressed(),
            system_identifier: self.system_identifier,
            generating_software: self.generating_software,
            point_record_length: self.point_record_length,
            point_count: self.point_count,
            offset_to_point_data: self.offset_to_point_data,
            scale: self.scale,
            offset: self.offset,
            bounds: self.bounds,
            crs_units: crs.units,
            crs_info: crs.info,
            crs_name: crs.name,
            epsg: crs.epsg,
        }
    }
}

fn read_array<const N: usize>(buf: &[u8], at: usize) -> Result<[u8; N]> {
    buf.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| anyhow!("header truncated at byte {at} ({} bytes read)", buf.len()))
}

pub(crate) fn u16_at(buf: &[u8], at: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(read_array(buf, at)?))
}

fn u32_at(buf: &[u8], at: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(buf, at)?))
}

fn u64_at(buf: &[u8], at: usize) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array(buf, at)?))
}

fn f64_at(buf: &[u8], at: usize) -> Result<f64> {
    Ok(f64::from_le_bytes(read_array(buf, at)?))
}

fn triple_at(buf: &[u8], at: usize) -> Result<[f64; 3]> {
    Ok([f64_at(buf, at)?, f64_at(buf, at + 8)?, f64_at(buf, at + 16)?])
}

/// Fixed-width, NUL-padded text field.
pub(crate) fn fixed_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Parse the public header block from the first bytes of a file.
///
/// `buf` may be longer than the header; fields past `header_size` are ignored.
pub fn parse_header(buf: &[u8]) -> Result<LasHeader> {
    if buf.len() < SIGNATURE.len() || &buf[..SIGNATURE.len()] != SIGNATURE {
        bail!("missing LASF signature");
    }
    if buf.len() < MIN_HEADER_LEN {
        bail!(
            "header truncated: {} bytes, need at least {}",
            buf.len(),
            MIN_HEADER_LEN
        );
    }

    let version_major = buf[24];
    let version_minor = buf[25];
    let header_size = u16_at(buf, 94)?;
    if usize::from(header_size) < MIN_HEADER_LEN {
        bail!("header size {header_size} is smaller than {MIN_HEADER_LEN}");
    }
    let offset_to_point_data = u32_at(buf, 96)?;
    if offset_to_point_data < u32::from(header_size) {
        bail!("point data offset {offset_to_point_data} lies inside the {header_size}-byte header");
    }
    let point_record_length = u16_at(buf, 105)?;
    if point_record_length < 12 {
        bail!("point record length {point_record_length} is too short for XYZ");
    }

    let legacy_count = u64::from(u32_at(buf, 107)?);
    let point_count = if (version_major, version_minor) >= (1, 4)
        && usize::from(header_size) >= POINT_COUNT_64_AT + 8
        && buf.len() >= POINT_COUNT_64_AT + 8
    {
        match u64_at(buf, POINT_COUNT_64_AT)? {
            0 => legacy_count,
            n => n,
        }
    } else {
        legacy_count
    };

    // Stored as max x, min x, max y, min y, max z, min z.
    let extents = [
        f64_at(buf, 179)?,
        f64_at(buf, 187)?,
        f64_at(buf, 195)?,
        f64_at(buf, 203)?,
        f64_at(buf, 211)?,
        f64_at(buf, 219)?,
    ];

    Ok(LasHeader {
        version_major,
        version_minor,
        system_identifier: fixed_str(&buf[26..58]),
        generating_software: fixed_str(&buf[58..90]),
        header_size,
        offset_to_point_data,
        vlr_count: u32_at(buf, 100)?,
        point_format_raw: buf[104],
        point_record_length,
        point_count,
        scale: triple_at(buf, 131)?,
        offset: triple_at(buf, 155)?,
        bounds: Bounds3::new(
            [extents[1], extents[3], extents[5]],
            [extents[0], extents[2], extents[4]],
        ),
    })
}
