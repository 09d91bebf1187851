use std::sync::Arc;

use ndarray::Array4;
use stemscope_algorithms::{
    AggregationMode, DetectionParams, DiskRequest, Engine, EngineConfig, FftSource, GeometrySpec,
    KernelMode, KernelParams, Mask, Probe, RecomputeRequest, ScalingMode, VacuumProbeConfig,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn disk_value(qx: usize, qy: usize, center: (f64, f64), radius: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let (dx, dy) = (qx as f64 - center.0, qy as f64 - center.1);
    if dx * dx + dy * dy <= radius * radius {
        1.0
    } else {
        0.0
    }
}

/// Scan row 0 is vacuum (central beam only); other rows add two Bragg disks.
fn crystal_cube() -> Array4<f64> {
    Array4::from_shape_fn((4, 4, 48, 48), |(rx, _, qx, qy)| {
        let beam = disk_value(qx, qy, (24.0, 24.0), 3.0);
        if rx == 0 {
            beam
        } else {
            beam + 0.5 * disk_value(qx, qy, (24.0, 36.0), 3.0)
                + 0.5 * disk_value(qx, qy, (24.0, 12.0), 3.0)
        }
    })
}

fn base_request() -> RecomputeRequest {
    RecomputeRequest::new(
        GeometrySpec::Annulus {
            center: (24.0, 24.0),
            r_inner: 5.0,
            r_outer: 15.0,
        },
        AggregationMode::Integrating,
        GeometrySpec::Point { x: 2.0, y: 2.0 },
        AggregationMode::SinglePixel,
    )
}

#[test]
fn test_full_pass_with_disk_detection() {
    init_logging();
    let cube = crystal_cube();
    let vacuum_rows = ndarray::Array2::from_shape_fn((4, 4), |(rx, _)| rx == 0);
    let probe = Probe::from_vacuum(
        &cube,
        Some(&Mask::from_array(vacuum_rows)),
        &VacuumProbeConfig::default(),
    )
    .unwrap();
    assert!((probe.size() - 3.0).abs() < 0.5);

    let kernel = probe
        .kernel(KernelMode::Flat, &KernelParams::default())
        .unwrap();
    let request = base_request()
        .with_image_scaling(ScalingMode::SquareRoot)
        .with_pattern_scaling(ScalingMode::log())
        .with_disk_detection(DiskRequest {
            kernel: Arc::new(kernel),
            params: DetectionParams::default()
                .with_edge_boundary(4)
                .with_min_peak_spacing(8.0),
            radius: probe.size(),
        });

    let engine = Engine::new(EngineConfig::default().with_fft_source(Some(FftSource::Ewpc)));
    let result = engine.recompute(&cube, &request).unwrap().unwrap();

    let disks = result.disks.as_ref().unwrap();
    assert_eq!(disks.len(), 3);
    let brightest = disks.peaks()[0];
    assert!((brightest.qx - 24.0).abs() < 1e-6 && (brightest.qy - 24.0).abs() < 1e-6);
    assert_eq!(result.annotations.len(), 3);
    assert!((result.annotations[0].radius - probe.size()).abs() < f64::EPSILON);

    // Only non-vacuum rows see the Bragg disks inside the annulus.
    let image = &result.virtual_image.raw;
    assert!(image[[0, 0]] < image[[1, 0]]);
    assert_eq!(result.virtual_image.scaling, ScalingMode::SquareRoot);

    let spectrum = result.spectrum.as_ref().unwrap();
    assert_eq!(spectrum.title(), "EWPC");
    assert_eq!(spectrum.magnitude.dim(), (48, 48));
}

#[test]
fn test_concurrent_passes_publish_newest() {
    init_logging();
    let cube = crystal_cube();
    let engine = Engine::new(EngineConfig::default().with_parallel(false));

    let published: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = &engine;
                let cube = &cube;
                scope.spawn(move || {
                    let scaling = if i % 2 == 0 {
                        ScalingMode::Linear
                    } else {
                        ScalingMode::SquareRoot
                    };
                    let request = base_request().with_image_scaling(scaling);
                    engine
                        .recompute(cube, &request)
                        .unwrap()
                        .map(|result| result.generation)
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect()
    });

    let last = engine.last_result().unwrap();
    assert!(!published.is_empty());
    assert_eq!(Some(&last.generation), published.iter().max());
}

#[test]
fn test_error_does_not_publish() {
    init_logging();
    let cube = crystal_cube();
    let engine = Engine::default();
    let bad = RecomputeRequest::new(
        GeometrySpec::Point { x: 0.0, y: 0.0 },
        AggregationMode::Sum,
        GeometrySpec::Point { x: 0.0, y: 0.0 },
        AggregationMode::SinglePixel,
    );
    assert!(engine.recompute(&cube, &bad).is_err());
    assert!(engine.last_result().is_none());
}
