//! Variable length records and CRS unit detection.

use anyhow::{Result, bail};
use log::debug;
use std::io::{Read, Seek, SeekFrom};

use super::header::{LasHeader, fixed_str, u16_at};
use crate::CrsUnits;

pub const VLR_HEADER_LEN: usize = 54;
const PROJECTION_USER_ID: &str = "LASF_Projection";
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const OGC_WKT: u16 = 2112;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const PROJ_LINEAR_UNITS_KEY: u16 = 3076;
/// GeoTIFF "user-defined" code; not an EPSG registry entry.
const USER_DEFINED: u16 = 32767;

#[derive(Clone, Debug, PartialEq)]
pub struct Vlr {
    pub user_id: String,
    pub record_id: u16,
    pub payload: Vec<u8>,
}

impl Vlr {
    fn is_projection(&self, record_id: u16) -> bool {
        self.user_id == PROJECTION_USER_ID && self.record_id == record_id
    }
}

fn read_one<R: Read>(reader: &mut R) -> Result<Vlr> {
    let mut head = [0u8; VLR_HEADER_LEN];
    reader.read_exact(&mut head)?;
    let len = usize::from(u16_at(&head, 20)?);
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Vlr {
        user_id: fixed_str(&head[2..18]),
        record_id: u16_at(&head, 18)?,
        payload,
    })
}

/// Read the VLRs that follow the header. CRS data is optional, so a malformed record ends the
/// scan and returns what was read so far.
pub fn read_vlrs<R: Read + Seek>(reader: &mut R, header: &LasHeader) -> Vec<Vlr> {
    let mut vlrs = Vec::new();
    if let Err(e) = reader.seek(SeekFrom::Start(u64::from(header.header_size))) {
        debug!("VLR scan skipped: {}", e);
        return vlrs;
    }
    for i in 0..header.vlr_count {
        match read_one(reader) {
            Ok(vlr) => vlrs.push(vlr),
            Err(e) => {
                debug!("VLR {} of {} unreadable, stopping scan: {}", i + 1, header.vlr_count, e);
                break;
            }
        }
    }
    vlrs
}

/// Keys of interest from a GeoKeyDirectory payload.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct GeoKeys {
    linear_units: Option<CrsUnits>,
    projected_epsg: Option<u32>,
}

fn parse_geokeys(payload: &[u8]) -> Result<GeoKeys> {
    if payload.len() < 8 {
        bail!("GeoKeyDirectory shorter than its header");
    }
    let mut keys = GeoKeys::default();
    let key_count = usize::from(u16_at(payload, 6)?);
    for k in 0..key_count {
        let at = 8 + k * 8;
        let key_id = u16_at(payload, at)?;
        let location = u16_at(payload, at + 2)?;
        let value = u16_at(payload, at + 6)?;
        // location 0: the value is stored inline
        if location != 0 {
            continue;
        }
        match key_id {
            PROJ_LINEAR_UNITS_KEY => {
                keys.linear_units = Some(match value {
                    9001 => CrsUnits::Meters,
                    9002 => CrsUnits::Feet,
                    9003 => CrsUnits::UsSurveyFeet,
                    _ => CrsUnits::Unknown,
                });
            }
            PROJECTED_CS_TYPE_KEY if value != 0 && value != USER_DEFINED => {
                keys.projected_epsg = Some(u32::from(value));
            }
            _ => {}
        }
    }
    Ok(keys)
}

/// First `"EPSG","NNNN"` authority code in WKT-style text.
pub fn epsg_from_text(text: &str) -> Option<u32> {
    const MARKER: &str = "\"EPSG\",\"";
    text.match_indices(MARKER).find_map(|(at, _)| {
        let rest = &text[at + MARKER.len()..];
        let digits = rest.split('"').next()?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    })
}

/// Leading `|`-separated segment of a GeoAscii citation, e.g. the projected CRS name.
fn primary_name(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    text.split(['|', '\0'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Unit detection from free CRS text (GeoAscii citation or WKT).
pub fn units_from_text(text: &str) -> CrsUnits {
    let lower = text.to_lowercase();
    if text.contains("US survey foot") || text.contains("Linear_Foot_US_Survey") {
        CrsUnits::UsSurveyFeet
    } else if lower.contains("linear_foot") || lower.contains("ftus") {
        CrsUnits::Feet
    } else if lower.contains("meter") && (lower.contains("linear_meter") || lower.contains("unit[")) {
        CrsUnits::Meters
    } else {
        CrsUnits::Unknown
    }
}

fn payload_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .split(['\0', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// CRS facts gathered from the projection VLRs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrsDetails {
    pub units: CrsUnits,
    /// All GeoAscii / WKT text, joined with ` | `.
    pub info: String,
    pub name: Option<String>,
    pub epsg: Option<u32>,
}

/// Units, name, EPSG code and a description from projection VLRs. GeoKeys win over text.
pub fn resolve_crs(vlrs: &[Vlr]) -> CrsDetails {
    let mut keys = GeoKeys::default();
    let mut texts = Vec::new();
    let mut ascii_name = None;
    let mut wkt_name = None;
    for vlr in vlrs {
        if vlr.is_projection(GEO_KEY_DIRECTORY) {
            match parse_geokeys(&vlr.payload) {
                Ok(found) => {
                    if let Some(u) = found.linear_units.filter(|u| *u != CrsUnits::Unknown) {
                        keys.linear_units = Some(u);
                    }
                    keys.projected_epsg = keys.projected_epsg.or(found.projected_epsg);
                }
                Err(e) => debug!("GeoKeyDirectory ignored: {}", e),
            }
        } else if vlr.is_projection(GEO_ASCII_PARAMS) || vlr.is_projection(OGC_WKT) {
            let text = payload_text(&vlr.payload);
            if text.is_empty() {
                continue;
            }
            if vlr.record_id == GEO_ASCII_PARAMS {
                ascii_name = ascii_name.or_else(|| primary_name(&vlr.payload));
            } else {
                wkt_name = wkt_name.or_else(|| wkt_crs_name(&text));
            }
            texts.push(text);
        }
    }
    let info = texts.join(" | ");
    CrsDetails {
        units: keys.linear_units.unwrap_or_else(|| units_from_text(&info)),
        name: ascii_name.or(wkt_name),
        epsg: keys.projected_epsg.or_else(|| epsg_from_text(&info)),
        info,
    }
}

/// Name of the outermost WKT node, e.g. `PROJCS["NAD83 / UTM zone 15N",...`.
fn wkt_crs_name(wkt: &str) -> Option<String> {
    let open = wkt.find("[\"")?;
    let rest = &wkt[open + 2..];
    let name = &rest[..rest.find('"')?];
    (!name.trim().is_empty()).then(|| name.trim().to_string())
}
