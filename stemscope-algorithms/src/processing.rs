//! Recompute passes that combine aggregation, scaling and analysis.
//!
//! A pass computes the virtual image, the diffraction aggregate, the
//! frequency-domain view and optionally the Bragg disks for one request.
//! Every pass takes a generation number when it starts; only the pass
//! holding the newest generation may publish its result, so a slow pass
//! overtaken by a newer request is dropped instead of overwriting it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use stemscope_core::{
    scale, AggregationMode, DataCube, EngineConfig, FftSource, Field2D, GeometrySpec, Result,
    ScalingMode,
};

use crate::aggregate::{Aggregator, Reduction};
use crate::disks::{
    BraggPeakSet, CorrelationPeakFinder, DetectionParams, DiskAnnotation, DiskDetector,
};
use crate::kernel::Kernel;
use crate::phase::PhaseIntegrator;
use crate::spectrum::{spectrum, Spectrum};

/// Disk detection to run on the diffraction aggregate of a pass.
#[derive(Debug, Clone)]
pub struct DiskRequest {
    /// Correlation kernel, shaped like the detector plane.
    pub kernel: Arc<Kernel>,
    /// Peak-finding parameters.
    pub params: DetectionParams,
    /// Radius of the drawn disk annotations (the probe size).
    pub radius: f64,
}

/// Everything one pass needs besides the dataset.
#[derive(Debug, Clone)]
pub struct RecomputeRequest {
    /// Detector-plane geometry of the virtual image.
    pub detector: GeometrySpec,
    /// Aggregation mode of the virtual image.
    pub image_mode: AggregationMode,
    /// Requested display scaling of the virtual image.
    pub image_scaling: ScalingMode,
    /// Scan-plane geometry of the diffraction aggregate.
    pub region: GeometrySpec,
    /// Aggregation mode of the diffraction aggregate.
    pub pattern_mode: AggregationMode,
    /// Requested display scaling of the diffraction aggregate.
    pub pattern_scaling: ScalingMode,
    /// Optional disk detection.
    pub disks: Option<DiskRequest>,
}

impl RecomputeRequest {
    /// Request with linear scaling and no disk detection.
    #[must_use]
    pub fn new(
        detector: GeometrySpec,
        image_mode: AggregationMode,
        region: GeometrySpec,
        pattern_mode: AggregationMode,
    ) -> Self {
        Self {
            detector,
            image_mode,
            image_scaling: ScalingMode::Linear,
            region,
            pattern_mode,
            pattern_scaling: ScalingMode::Linear,
            disks: None,
        }
    }

    /// Set the virtual image scaling.
    #[must_use]
    pub fn with_image_scaling(mut self, scaling: ScalingMode) -> Self {
        self.image_scaling = scaling;
        self
    }

    /// Set the diffraction aggregate scaling.
    #[must_use]
    pub fn with_pattern_scaling(mut self, scaling: ScalingMode) -> Self {
        self.pattern_scaling = scaling;
        self
    }

    /// Run disk detection on the diffraction aggregate.
    #[must_use]
    pub fn with_disk_detection(mut self, disks: DiskRequest) -> Self {
        self.disks = Some(disks);
        self
    }
}

/// A reduction together with its display-scaled values.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledView {
    /// Unscaled values.
    pub raw: Field2D,
    /// Values after `scaling`.
    pub display: Field2D,
    /// Provenance label.
    pub label: String,
    /// Scaling actually applied.
    pub scaling: ScalingMode,
}

impl ScaledView {
    fn new(reduction: Reduction, scaling: ScalingMode) -> Self {
        let display = scale(&reduction.raw, scaling);
        Self {
            raw: reduction.raw,
            display,
            label: reduction.label,
            scaling,
        }
    }
}

/// Published output of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassResult {
    /// Generation of the pass that produced this result.
    pub generation: u64,
    /// Scan-plane view.
    pub virtual_image: ScaledView,
    /// Detector-plane view.
    pub diffraction: ScaledView,
    /// Frequency-domain view, when enabled.
    pub spectrum: Option<Spectrum>,
    /// Detected disks, when requested.
    pub disks: Option<BraggPeakSet>,
    /// Circles to draw for `disks`.
    pub annotations: Vec<DiskAnnotation>,
}

/// Generation handle of a pass.
#[derive(Debug, Clone)]
pub struct PassToken {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl PassToken {
    /// Generation number of this pass.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer pass has started since this one.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}

/// Runs recompute passes and keeps the latest published result.
pub struct Engine {
    config: EngineConfig,
    aggregator: Aggregator,
    detector: DiskDetector,
    latest: Arc<AtomicU64>,
    last: Mutex<Option<Arc<PassResult>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("latest", &self.latest.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let aggregator = Aggregator::new()
            .with_annulus_margin(config.annulus_margin)
            .with_parallel(config.parallel);
        Self {
            config,
            aggregator,
            detector: DiskDetector::default(),
            latest: Arc::new(AtomicU64::new(0)),
            last: Mutex::new(None),
        }
    }

    /// Use a different phase integrator for iCoM images.
    #[must_use]
    pub fn with_phase_integrator(mut self, integrator: Arc<dyn PhaseIntegrator>) -> Self {
        self.aggregator = self.aggregator.with_phase_integrator(integrator);
        self
    }

    /// Use a different correlation peak finder for disk detection.
    #[must_use]
    pub fn with_peak_finder(mut self, finder: Arc<dyn CorrelationPeakFinder>) -> Self {
        self.detector = self.detector.with_finder(finder);
        self
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new pass, superseding every pass started before it.
    pub fn begin_pass(&self) -> PassToken {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        PassToken {
            generation,
            latest: Arc::clone(&self.latest),
        }
    }

    /// The most recently published result.
    #[must_use]
    pub fn last_result(&self) -> Option<Arc<PassResult>> {
        self.last.lock().clone()
    }

    /// Virtual image with display scaling. Center-of-mass modes are always
    /// shown linearly.
    pub fn virtual_image_view<C>(
        &self,
        cube: &C,
        geometry: &GeometrySpec,
        mode: AggregationMode,
        scaling: ScalingMode,
    ) -> Result<ScaledView>
    where
        C: DataCube + ?Sized,
    {
        let requested = self.config.resolve_scaling(scaling);
        let applied = mode.effective_scaling(requested);
        if applied != requested {
            debug!("{mode} image shown with {applied} scaling instead of {requested}");
        }
        let image = self.aggregator.virtual_image(cube, geometry, mode)?;
        Ok(ScaledView::new(image, applied))
    }

    /// Diffraction aggregate with display scaling.
    pub fn diffraction_view<C>(
        &self,
        cube: &C,
        geometry: &GeometrySpec,
        mode: AggregationMode,
        scaling: ScalingMode,
    ) -> Result<ScaledView>
    where
        C: DataCube + ?Sized,
    {
        let pattern = self.aggregator.diffraction_aggregate(cube, geometry, mode)?;
        Ok(ScaledView::new(pattern, self.config.resolve_scaling(scaling)))
    }

    /// Run a full pass. Returns `Ok(None)` when a newer pass started first.
    pub fn recompute<C>(
        &self,
        cube: &C,
        request: &RecomputeRequest,
    ) -> Result<Option<Arc<PassResult>>>
    where
        C: DataCube + ?Sized,
    {
        let token = self.begin_pass();
        self.recompute_with(&token, cube, request)
    }

    /// Run a pass under an existing token.
    pub fn recompute_with<C>(
        &self,
        token: &PassToken,
        cube: &C,
        request: &RecomputeRequest,
    ) -> Result<Option<Arc<PassResult>>>
    where
        C: DataCube + ?Sized,
    {
        let generation = token.generation();
        debug!("pass {generation} started");

        let virtual_image = self.virtual_image_view(
            cube,
            &request.detector,
            request.image_mode,
            request.image_scaling,
        )?;
        if self.is_stale(token) {
            return Ok(None);
        }

        let diffraction = self.diffraction_view(
            cube,
            &request.region,
            request.pattern_mode,
            request.pattern_scaling,
        )?;
        if self.is_stale(token) {
            return Ok(None);
        }

        let spectrum = self.config.fft_source.map(|source| match source {
            FftSource::Direct => spectrum(&virtual_image.display, source),
            FftSource::Ewpc => spectrum(&diffraction.raw, source),
        });

        let (disks, annotations) = match &request.disks {
            Some(disk_request) => {
                let peaks = self.detector.detect(
                    &diffraction.raw,
                    &disk_request.kernel,
                    &disk_request.params,
                )?;
                let annotations = peaks.annotations(disk_request.radius);
                (Some(peaks), annotations)
            }
            None => (None, Vec::new()),
        };

        let result = Arc::new(PassResult {
            generation,
            virtual_image,
            diffraction,
            spectrum,
            disks,
            annotations,
        });

        let mut last = self.last.lock();
        if !token.is_current() {
            debug!("pass {generation} superseded before publishing");
            return Ok(None);
        }
        *last = Some(Arc::clone(&result));
        debug!("pass {generation} published");
        Ok(Some(result))
    }

    fn is_stale(&self, token: &PassToken) -> bool {
        let stale = !token.is_current();
        if stale {
            debug!(
                "pass {} superseded by pass {}",
                token.generation(),
                self.latest.load(Ordering::Acquire)
            );
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn cube() -> Array4<f64> {
        Array4::from_shape_fn((4, 4, 8, 8), |(rx, ry, qx, qy)| {
            1.0 + (rx * 4 + ry) as f64 + 0.01 * (qx * 8 + qy) as f64
        })
    }

    fn request() -> RecomputeRequest {
        RecomputeRequest::new(
            GeometrySpec::Circle {
                center: (4.0, 4.0),
                radius: 2.0,
            },
            AggregationMode::Integrating,
            GeometrySpec::Point { x: 1.0, y: 1.0 },
            AggregationMode::SinglePixel,
        )
    }

    #[test]
    fn test_pass_publishes_result() {
        let engine = Engine::new(EngineConfig::default());
        let cube = cube();
        let result = engine.recompute(&cube, &request()).unwrap().unwrap();
        assert_eq!(result.generation, 1);
        assert_eq!(result.virtual_image.raw.dim(), (4, 4));
        assert_eq!(result.diffraction.raw.dim(), (8, 8));
        assert_eq!(result.diffraction.label, "Real Space Pixel: [1,1]");
        assert!(result.spectrum.is_some());
        assert!(result.disks.is_none());
        assert_eq!(engine.last_result().as_deref(), Some(&*result));
    }

    #[test]
    fn test_superseded_pass_is_dropped() {
        let engine = Engine::default();
        let cube = cube();
        let old = engine.begin_pass();
        let new = engine.begin_pass();
        assert!(!old.is_current());
        assert!(engine.recompute_with(&old, &cube, &request()).unwrap().is_none());
        assert!(engine.last_result().is_none());

        let published = engine.recompute_with(&new, &cube, &request()).unwrap().unwrap();
        assert_eq!(published.generation, new.generation());
    }

    #[test]
    fn test_com_image_forced_linear() {
        let engine = Engine::default();
        let view = engine
            .virtual_image_view(
                &cube(),
                &GeometrySpec::Circle {
                    center: (4.0, 4.0),
                    radius: 3.0,
                },
                AggregationMode::CoMAngle,
                ScalingMode::log(),
            )
            .unwrap();
        assert_eq!(view.scaling, ScalingMode::Linear);
        assert_eq!(view.display, view.raw);
    }

    #[test]
    fn test_log_floor_from_config() {
        let engine = Engine::new(EngineConfig::default().with_log_floor(0.5));
        let view = engine
            .diffraction_view(
                &cube(),
                &GeometrySpec::Point { x: 0.0, y: 0.0 },
                AggregationMode::SinglePixel,
                ScalingMode::log(),
            )
            .unwrap();
        assert_eq!(view.scaling, ScalingMode::Log(0.5));
        assert!(view.display.iter().all(|&v| v >= -1.0));
    }

    #[test]
    fn test_spectrum_disabled() {
        let engine = Engine::new(EngineConfig::default().with_fft_source(None));
        let result = engine.recompute(&cube(), &request()).unwrap().unwrap();
        assert!(result.spectrum.is_none());
    }
}
