mod common;

use common::{
    FailingHull, FixedMemory, GIB, MIB, RecordingHull, ScriptedDecoder, Script, StuckHull,
    grid_points, heavy_options, item, light_options, meta, square_meta,
};
use lasbatch::engine::{EstimatorSettings, ResourceEstimator, SubStage};
use lasbatch::geometry::{HullBuilder, MonotoneChainHull};
use lasbatch::pipeline::{ItemPipeline, stride_for};
use lasbatch::{
    CancellationToken, CrsUnits, FootprintMethod, ItemError, PipelineState, ProcessingResult,
    ResourceEstimate, RunOptions, WorkItem,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const PLANNED: ResourceEstimate = ResourceEstimate {
    estimated_need_bytes: 0,
    decimation: 1.0,
    constrained: false,
};

fn process(
    decoder: &Arc<ScriptedDecoder>,
    hull: Arc<dyn HullBuilder>,
    available: u64,
    options: &RunOptions,
    cancel: &CancellationToken,
    work: &WorkItem,
) -> ProcessingResult {
    let estimator = ResourceEstimator::new(
        FixedMemory::new(available),
        EstimatorSettings::from(options),
    );
    let pipeline = ItemPipeline {
        decoder: decoder.clone(),
        hull,
        estimator: &estimator,
        options,
        cancel,
        worker_count: 1,
        sub_progress: None,
    };
    pipeline.process(work, &PLANNED)
}

// --- size validation ---

#[test]
fn test_oversize_fails_without_decoding() {
    let decoder = ScriptedDecoder::new();
    decoder.script("big", Script::Ok(square_meta(10), vec![]));
    let opts = RunOptions {
        max_item_size_bytes: GIB,
        ..light_options()
    };
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &opts,
        &CancellationToken::new(),
        &item("big", 2 * GIB),
    );
    assert_eq!(
        r.error(),
        Some(&ItemError::Oversize {
            size: 2 * GIB,
            limit: GIB
        })
    );
    assert_eq!(r.last_state, PipelineState::Queued);
    assert_eq!(decoder.decodes(), 0);
}

// --- decode ---

#[test]
fn test_decode_error_is_isolated_failure() {
    let decoder = ScriptedDecoder::new();
    decoder.script("bad", Script::Fail("bad signature".into()));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &CancellationToken::new(),
        &item("bad", MIB),
    );
    assert!(r.is_failure());
    assert_eq!(r.error().map(|e| e.kind()), Some("decode"));
    assert_eq!(r.last_state, PipelineState::SizeValidated);
    assert_eq!(r.final_state(), PipelineState::Failed);
}

#[test]
fn test_decoder_panic_becomes_decode_error() {
    let decoder = ScriptedDecoder::new();
    decoder.script("boom", Script::Panic);
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &CancellationToken::new(),
        &item("boom", MIB),
    );
    match r.error() {
        Some(ItemError::Decode { message }) => assert!(message.contains("panicked")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_light_metrics_from_header() {
    let decoder = ScriptedDecoder::new();
    decoder.script("a", Script::Ok(square_meta(50_000), vec![]));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &CancellationToken::new(),
        &item("a", 3 * MIB),
    );
    let m = r.metrics().expect("completed");
    assert_eq!(m.point_count, 50_000);
    assert_eq!(m.file_size_bytes, 3 * MIB);
    assert_eq!(m.version, "1.2");
    assert!((m.extent_area_sq_m - 10_000.0).abs() < 1e-9);
    assert!((m.point_density - 5.0).abs() < 1e-9);
    assert!(m.footprint.is_none());
    assert_eq!(r.decimation_used, None);
    assert_eq!(r.last_state, PipelineState::MetadataDecoded);
}

#[test]
fn test_feet_extent_is_converted() {
    let decoder = ScriptedDecoder::new();
    let mut m = meta(1_000, [0.0, 0.0, 0.0], [1000.0, 1000.0, 0.0]);
    m.crs_units = CrsUnits::Feet;
    decoder.script("ft", Script::Ok(m, vec![]));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &CancellationToken::new(),
        &item("ft", MIB),
    );
    let area = r.metrics().unwrap().extent_area_sq_m;
    assert!((area - 1_000_000.0 * 0.3048 * 0.3048).abs() < 1e-6);
}

#[test]
fn test_supplied_metadata_skips_decoder() {
    let decoder = ScriptedDecoder::new();
    let work = item("pre", MIB).with_metadata(square_meta(7));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &CancellationToken::new(),
        &work,
    );
    assert_eq!(r.metrics().unwrap().point_count, 7);
    assert_eq!(decoder.decodes(), 0);
}

// --- heavy computation ---

#[test]
fn test_heavy_hull_footprint() {
    let decoder = ScriptedDecoder::new();
    decoder.script("tile", Script::Ok(square_meta(400), grid_points(20)));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &heavy_options(),
        &CancellationToken::new(),
        &item("tile", 10 * MIB),
    );
    let m = r.metrics().expect("completed");
    let fp = m.footprint.as_ref().expect("footprint");
    assert_eq!(fp.method, FootprintMethod::ConvexHull);
    assert!(!fp.degraded);
    assert_eq!(fp.sampled_points, 400);
    assert!((fp.area_sq_m - 10_000.0).abs() < 1e-6);
    assert!((fp.acres - 10_000.0 / 4046.856_422_4).abs() < 1e-9);
    assert!((m.point_density - 0.04).abs() < 1e-9);
    assert_eq!(r.decimation_used, Some(1.0));
    assert_eq!(r.last_state, PipelineState::HeavyComputed);
}

#[test]
fn test_heavy_uses_stride_of_decimation() {
    let decoder = ScriptedDecoder::new();
    decoder.script("c", Script::Ok(square_meta(10_000), grid_points(100)));
    let hull = Arc::new(RecordingHull::default());
    // 6 GiB available: constrained, decimation 0.01 -> stride 100
    let r = process(
        &decoder,
        hull.clone(),
        6 * GIB,
        &heavy_options(),
        &CancellationToken::new(),
        &item("c", 10 * MIB),
    );
    assert_eq!(r.decimation_used, Some(0.01));
    assert_eq!(stride_for(0.01), 100);
    assert_eq!(*hull.inputs.lock().unwrap(), vec![100]);
    let fp = r.metrics().unwrap().footprint.clone().unwrap();
    assert_eq!(fp.sampled_points, 100);
}

#[test]
fn test_degenerate_hull_falls_back_to_extent() {
    let decoder = ScriptedDecoder::new();
    decoder.script("flat", Script::Ok(square_meta(100), grid_points(10)));
    let r = process(
        &decoder,
        Arc::new(FailingHull),
        16 * GIB,
        &heavy_options(),
        &CancellationToken::new(),
        &item("flat", MIB),
    );
    assert!(r.is_success());
    let fp = r.metrics().unwrap().footprint.clone().unwrap();
    assert_eq!(fp.method, FootprintMethod::BoundingExtent);
    assert!(fp.degraded);
    assert!(fp.fallback_reason.as_deref().unwrap().contains("degenerate"));
    assert!((fp.area_sq_m - 10_000.0).abs() < 1e-6);
}

#[test]
fn test_collinear_points_fall_back() {
    let decoder = ScriptedDecoder::new();
    let line: Vec<[f64; 2]> = (0..50).map(|i| [i as f64, 5.0]).collect();
    decoder.script("line", Script::Ok(square_meta(50), line));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &heavy_options(),
        &CancellationToken::new(),
        &item("line", MIB),
    );
    let fp = r.metrics().unwrap().footprint.clone().unwrap();
    assert!(fp.degraded);
    assert_eq!(fp.area_sq_m, 0.0);
    assert_eq!(fp.vertex_count, 0);
    // zero footprint area keeps the extent density
    assert!((r.metrics().unwrap().point_density - 50.0 / 10_000.0).abs() < 1e-12);
}

#[test]
fn test_sub_progress_stages_in_order() {
    let decoder = ScriptedDecoder::new();
    decoder.script("s", Script::Ok(square_meta(16), grid_points(4)));
    let options = heavy_options();
    let estimator = ResourceEstimator::new(
        FixedMemory::new(16 * GIB),
        EstimatorSettings::from(&options),
    );
    let cancel = CancellationToken::new();
    let seen = Mutex::new(Vec::new());
    let record = |p: lasbatch::SubProgress<'_>| seen.lock().unwrap().push(p.stage);
    let pipeline = ItemPipeline {
        decoder: decoder.clone(),
        hull: Arc::new(MonotoneChainHull),
        estimator: &estimator,
        options: &options,
        cancel: &cancel,
        worker_count: 1,
        sub_progress: Some(&record),
    };
    assert!(pipeline.process(&item("s", MIB), &PLANNED).is_success());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            SubStage::Decoding,
            SubStage::Sampling {
                stride: 1,
                source_points: 16
            },
            SubStage::ComputingHull { points: 16 },
        ]
    );
}

// --- cancellation and timeout ---

#[test]
fn test_cancelled_before_start() {
    let decoder = ScriptedDecoder::new();
    decoder.script("a", Script::Ok(square_meta(1), vec![]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &cancel,
        &item("a", MIB),
    );
    assert!(r.is_cancelled());
    assert_eq!(r.last_state, PipelineState::Queued);
    assert_eq!(decoder.decodes(), 0);
}

#[test]
fn test_cancel_during_decode_observed_at_next_checkpoint() {
    let decoder = ScriptedDecoder::new();
    let cancel = CancellationToken::new();
    decoder.script("w", Script::WaitForCancel(cancel.clone(), square_meta(1)));
    let trigger = cancel.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        trigger.cancel();
    });
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &light_options(),
        &cancel,
        &item("w", MIB),
    );
    canceller.join().unwrap();
    assert!(r.is_cancelled());
    assert_eq!(r.last_state, PipelineState::MetadataDecoded);
}

#[test]
fn test_timeout_is_per_item_failure() {
    let decoder = ScriptedDecoder::new();
    decoder.script(
        "slow",
        Script::Slow(Duration::from_millis(60), square_meta(1)),
    );
    let opts = RunOptions {
        item_timeout: Some(Duration::from_millis(10)),
        ..light_options()
    };
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &opts,
        &CancellationToken::new(),
        &item("slow", MIB),
    );
    assert_eq!(r.error().map(|e| e.kind()), Some("timeout"));
}

#[test]
fn test_stuck_decoder_times_out_at_limit() {
    let decoder = ScriptedDecoder::new();
    decoder.script("stuck", Script::Slow(Duration::from_secs(3), square_meta(1)));
    let opts = RunOptions {
        item_timeout: Some(Duration::from_millis(50)),
        ..light_options()
    };
    let started = Instant::now();
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &opts,
        &CancellationToken::new(),
        &item("stuck", MIB),
    );
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(r.error().map(|e| e.kind()), Some("timeout"));
    assert_eq!(r.last_state, PipelineState::SizeValidated);
}

#[test]
fn test_stuck_hull_times_out_instead_of_falling_back() {
    let decoder = ScriptedDecoder::new();
    decoder.script("tile", Script::Ok(square_meta(100), grid_points(10)));
    let opts = RunOptions {
        item_timeout: Some(Duration::from_millis(100)),
        ..heavy_options()
    };
    let started = Instant::now();
    let r = process(
        &decoder,
        Arc::new(StuckHull),
        16 * GIB,
        &opts,
        &CancellationToken::new(),
        &item("tile", MIB),
    );
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(r.error().map(|e| e.kind()), Some("timeout"));
    assert_eq!(r.last_state, PipelineState::MetadataDecoded);
}

#[test]
fn test_timed_decode_panic_is_still_decode_error() {
    let decoder = ScriptedDecoder::new();
    decoder.script("boom", Script::Panic);
    let opts = RunOptions {
        item_timeout: Some(Duration::from_secs(5)),
        ..light_options()
    };
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &opts,
        &CancellationToken::new(),
        &item("boom", MIB),
    );
    assert_eq!(r.error().map(|e| e.kind()), Some("decode"));
}

// --- panics ---

#[test]
fn test_panic_keeps_last_reached_state() {
    let decoder = ScriptedDecoder::new();
    decoder.script("p", Script::PanicOnOpen(square_meta(10)));
    let r = process(
        &decoder,
        Arc::new(MonotoneChainHull),
        16 * GIB,
        &heavy_options(),
        &CancellationToken::new(),
        &item("p", MIB),
    );
    match r.error() {
        Some(lasbatch::ItemError::Panicked { message }) => {
            assert!(message.contains("point source exploded"))
        }
        other => panic!("expected panicked, got {other:?}"),
    }
    assert_eq!(r.last_state, PipelineState::MetadataDecoded);
    assert_eq!(r.decimation_used, Some(1.0));
}
