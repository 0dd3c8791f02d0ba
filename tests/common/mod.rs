#![allow(dead_code)]

//! Fake collaborators shared by the integration tests.

use anyhow::{Result, anyhow, bail};
use lasbatch::decode::{Decoder, PointSource};
use lasbatch::geometry::{Hull, HullBuilder, MonotoneChainHull};
use lasbatch::probe::MemoryProbe;
use lasbatch::{
    Bounds3, CancellationToken, Collaborators, CrsUnits, ItemMetadata, RunOptions, WorkItem,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * 1024 * 1024;

// --- memory probe ---

/// Fixed available memory; bytes read grow by `read_step` per call.
pub struct FixedMemory {
    pub available: AtomicU64,
    pub fail: AtomicBool,
    bytes_read: AtomicU64,
    read_step: u64,
}

impl FixedMemory {
    pub fn new(available: u64) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicU64::new(available),
            fail: AtomicBool::new(false),
            bytes_read: AtomicU64::new(0),
            read_step: MIB,
        })
    }

    pub fn failing() -> Arc<Self> {
        let probe = Self::new(0);
        probe.fail.store(true, Ordering::SeqCst);
        probe
    }
}

impl MemoryProbe for FixedMemory {
    fn available_memory(&self) -> Result<u64> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("memory introspection offline");
        }
        Ok(self.available.load(Ordering::SeqCst))
    }

    fn process_bytes_read(&self) -> Result<u64> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("io counters offline");
        }
        Ok(self.bytes_read.fetch_add(self.read_step, Ordering::SeqCst) + self.read_step)
    }
}

// --- decoder ---

/// What the scripted decoder does for one item id.
#[derive(Clone)]
pub enum Script {
    /// Metadata plus the XY points exposed for heavy computation.
    Ok(ItemMetadata, Vec<[f64; 2]>),
    Fail(String),
    Panic,
    /// Sleep, then succeed with the metadata.
    Slow(Duration, ItemMetadata),
    /// Block until the token is cancelled, then succeed.
    WaitForCancel(CancellationToken, ItemMetadata),
    /// Decode succeeds; opening the points panics.
    PanicOnOpen(ItemMetadata),
}

#[derive(Default)]
pub struct ScriptedDecoder {
    scripts: Mutex<HashMap<String, Script>>,
    pub decode_calls: AtomicUsize,
    pub open_calls: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, id: &str, script: Script) {
        self.scripts.lock().unwrap().insert(id.to_string(), script);
    }

    pub fn decodes(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, id: &str) -> Result<Script> {
        self.scripts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no script for {id}"))
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&self, item: &WorkItem) -> Result<ItemMetadata> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        match self.lookup(&item.id)? {
            Script::Ok(meta, _) => Ok(meta),
            Script::Fail(msg) => bail!("{msg}"),
            Script::Panic => panic!("decoder exploded on {}", item.id),
            Script::Slow(delay, meta) => {
                std::thread::sleep(delay);
                Ok(meta)
            }
            Script::PanicOnOpen(meta) => Ok(meta),
            Script::WaitForCancel(token, meta) => {
                while !token.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(meta)
            }
        }
    }

    fn open_points(
        &self,
        item: &WorkItem,
        _metadata: &ItemMetadata,
    ) -> Result<Box<dyn PointSource>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        match self.lookup(&item.id)? {
            Script::Ok(_, points) => Ok(Box::new(points)),
            Script::PanicOnOpen(_) => panic!("point source exploded on {}", item.id),
            _ => Ok(Box::new(Vec::<[f64; 2]>::new())),
        }
    }
}

// --- hull ---

/// Always rejects its input as degenerate.
pub struct FailingHull;

impl HullBuilder for FailingHull {
    fn hull(&self, points: Vec<[f64; 2]>) -> Result<Hull> {
        bail!("refusing {} points", points.len())
    }
}

/// Sleeps far past any test time limit before delegating to the real hull.
pub struct StuckHull;

impl HullBuilder for StuckHull {
    fn hull(&self, points: Vec<[f64; 2]>) -> Result<Hull> {
        std::thread::sleep(Duration::from_secs(3));
        MonotoneChainHull.hull(points)
    }
}

/// Records how many points each call received, then delegates to the real hull.
#[derive(Default)]
pub struct RecordingHull {
    pub inputs: Mutex<Vec<usize>>,
}

impl HullBuilder for RecordingHull {
    fn hull(&self, points: Vec<[f64; 2]>) -> Result<Hull> {
        self.inputs.lock().unwrap().push(points.len());
        MonotoneChainHull.hull(points)
    }
}

// --- builders ---

pub fn meta(point_count: u64, min: [f64; 3], max: [f64; 3]) -> ItemMetadata {
    ItemMetadata {
        version: (1, 2),
        system_identifier: "TEST".to_string(),
        generating_software: "fixture".to_string(),
        point_format: 1,
        compressed: false,
        point_record_length: 28,
        point_count,
        offset_to_point_data: 227,
        scale: [0.01; 3],
        offset: [0.0; 3],
        bounds: Bounds3::new(min, max),
        crs_units: CrsUnits::Meters,
        crs_info: String::new(),
        crs_name: None,
        epsg: None,
    }
}

/// 100 m x 100 m tile with `n` points.
pub fn square_meta(n: u64) -> ItemMetadata {
    meta(n, [0.0, 0.0, 0.0], [100.0, 100.0, 10.0])
}

/// `side × side` grid of points spanning 0..=100 on both axes.
pub fn grid_points(side: usize) -> Vec<[f64; 2]> {
    let step = 100.0 / (side.max(2) - 1) as f64;
    (0..side * side)
        .map(|i| [(i % side) as f64 * step, (i / side) as f64 * step])
        .collect()
}

pub fn item(id: &str, size_bytes: u64) -> WorkItem {
    WorkItem::new(id, format!("/virtual/{id}"), size_bytes)
}

pub fn collaborators(
    decoder: Arc<ScriptedDecoder>,
    hull: Arc<dyn HullBuilder>,
    memory: Arc<FixedMemory>,
) -> Collaborators {
    Collaborators::new(decoder, hull, memory)
}

pub fn light_options() -> RunOptions {
    RunOptions {
        monitor_interval: Duration::from_millis(5),
        ..RunOptions::default()
    }
}

pub fn heavy_options() -> RunOptions {
    RunOptions {
        heavy_computation_enabled: true,
        ..light_options()
    }
}
