//! Virtual image synthesis and diffraction aggregation.
//!
//! A virtual image reduces every diffraction pattern to one scalar through a
//! detector-plane geometry. A diffraction aggregate reduces a scan-plane
//! region to one pattern. Both return raw, unscaled values plus a provenance
//! label describing the geometry that produced them.

use std::sync::Arc;

use log::trace;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use stemscope_core::{
    AggregationMode, DataCube, Error, Field2D, GeometrySpec, Mask, MaskBuilder, Plane,
    PlaneShape, Result, DEFAULT_ANNULUS_MARGIN,
};

use crate::com::ComField;
use crate::phase::{FourierIntegrator, PhaseIntegrator};

/// Raw reduction result with its provenance label.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// Unscaled values, shaped like the complementary plane.
    pub raw: Field2D,
    /// Human-readable description of the geometry.
    pub label: String,
    /// Mode that produced `raw`.
    pub mode: AggregationMode,
}

/// Scan-plane image produced from a detector geometry.
pub type VirtualImage = Reduction;
/// Detector-plane pattern produced from a scan geometry.
pub type DiffractionAggregate = Reduction;

/// Reduces a [`DataCube`] over one of its planes.
#[derive(Clone)]
pub struct Aggregator {
    mask_builder: MaskBuilder,
    annulus_margin: f64,
    parallel: bool,
    integrator: Arc<dyn PhaseIntegrator>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            mask_builder: MaskBuilder::default(),
            annulus_margin: DEFAULT_ANNULUS_MARGIN,
            parallel: true,
            integrator: Arc::new(FourierIntegrator::default()),
        }
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("annulus_margin", &self.annulus_margin)
            .field("parallel", &self.parallel)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Create an aggregator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the margin enforced between annulus radii.
    #[must_use]
    pub fn with_annulus_margin(mut self, margin: f64) -> Self {
        self.annulus_margin = margin;
        self.mask_builder = self.mask_builder.with_annulus_margin(margin);
        self
    }

    /// Enable or disable parallel reduction over scan positions.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Replace the phase integrator used for iCoM images.
    #[must_use]
    pub fn with_phase_integrator(mut self, integrator: Arc<dyn PhaseIntegrator>) -> Self {
        self.integrator = integrator;
        self
    }

    /// Reduce each diffraction pattern to one scalar through `geometry`.
    ///
    /// The result always has the scan-plane shape. A point geometry reads
    /// the nearest detector pixel directly, whatever the mode.
    pub fn virtual_image<C>(
        &self,
        cube: &C,
        geometry: &GeometrySpec,
        mode: AggregationMode,
    ) -> Result<VirtualImage>
    where
        C: DataCube + ?Sized,
    {
        mode.ensure_plane(Plane::Detector)?;
        let shape = cube.shape();
        ensure_non_empty(shape.scan)?;
        ensure_non_empty(shape.detector)?;

        let geometry = geometry
            .settled(self.annulus_margin)
            .clamped(shape.detector);
        let label = geometry.describe(Plane::Detector, shape.detector);

        let raw = match (self.mask_builder.build(&geometry, shape.detector)?, geometry) {
            (None, GeometrySpec::Point { x, y }) => {
                let (qx, qy) = shape.detector.clamp_point(x, y);
                cube.scan_slice(qx, qy).to_owned()
            }
            (None, other) => {
                return Err(Error::UnsupportedGeometry {
                    geometry: other.kind().to_string(),
                    plane: Plane::Detector.to_string(),
                })
            }
            (Some(mask), _) => self.reduce_detector(cube, &mask, mode)?,
        };

        Ok(Reduction { raw, label, mode })
    }

    /// Reduce the patterns selected by `geometry` on the scan plane to one
    /// detector-plane pattern.
    ///
    /// A point geometry reads the pattern at the nearest scan position;
    /// [`AggregationMode::SinglePixel`] accepts nothing else.
    pub fn diffraction_aggregate<C>(
        &self,
        cube: &C,
        geometry: &GeometrySpec,
        mode: AggregationMode,
    ) -> Result<DiffractionAggregate>
    where
        C: DataCube + ?Sized,
    {
        mode.ensure_plane(Plane::Scan)?;
        let shape = cube.shape();
        ensure_non_empty(shape.scan)?;
        ensure_non_empty(shape.detector)?;

        let geometry = geometry.settled(self.annulus_margin).clamped(shape.scan);
        let label = geometry.describe(Plane::Scan, shape.scan);

        if let GeometrySpec::Point { x, y } = geometry {
            let (rx, ry) = shape.scan.clamp_point(x, y);
            return Ok(Reduction {
                raw: cube.detector_slice(rx, ry).to_owned(),
                label,
                mode,
            });
        }
        if mode == AggregationMode::SinglePixel {
            return Err(Error::UnsupportedGeometry {
                geometry: geometry.kind().to_string(),
                plane: Plane::Scan.to_string(),
            });
        }

        let raw = if let Some((xs, ys)) = geometry.pixel_ranges(shape.scan) {
            cube.scan_block(xs, ys)
                .sum_axis(Axis(0))
                .sum_axis(Axis(0))
        } else {
            let mut acc = Array2::zeros(shape.detector.dim());
            if let Some(mask) = self.mask_builder.build(&geometry, shape.scan)? {
                for (rx, ry) in mask.selected() {
                    acc += &cube.detector_slice(rx, ry);
                }
            }
            acc
        };

        Ok(Reduction { raw, label, mode })
    }

    /// Reduce every pattern over an explicit detector `mask`.
    pub fn reduce_detector<C>(
        &self,
        cube: &C,
        mask: &Mask,
        mode: AggregationMode,
    ) -> Result<Field2D>
    where
        C: DataCube + ?Sized,
    {
        let shape = cube.shape();
        if mask.shape() != shape.detector {
            return Err(Error::ShapeMismatch {
                expected: shape.detector.dim(),
                actual: mask.shape().dim(),
            });
        }
        trace!(
            "reducing {} patterns over {} detector pixels ({mode})",
            shape.scan.len(),
            mask.count()
        );

        let selected = mask.selected();
        match mode {
            AggregationMode::Integrating => {
                self.per_position(cube, |dp| masked_sum(dp, &selected))
            }
            AggregationMode::Maximum => self.per_position(cube, |dp| masked_max(dp, &selected)),
            AggregationMode::CoMMagnitude => {
                Ok(ComField::extract(cube, mask, self.parallel)?.magnitude())
            }
            AggregationMode::CoMAngle => Ok(ComField::extract(cube, mask, self.parallel)?.angle()),
            AggregationMode::ICoM => {
                let com = ComField::extract(cube, mask, self.parallel)?;
                let phase = self.integrator.integrate(&com.x, &com.y)?;
                if phase.dim() == shape.scan.dim() {
                    Ok(phase)
                } else {
                    Err(Error::ShapeMismatch {
                        expected: shape.scan.dim(),
                        actual: phase.dim(),
                    })
                }
            }
            AggregationMode::Sum | AggregationMode::SinglePixel => {
                Err(Error::UnsupportedAggregationMode {
                    mode: mode.to_string(),
                    plane: Plane::Detector.to_string(),
                })
            }
        }
    }

    fn per_position<C, F>(&self, cube: &C, reduce: F) -> Result<Field2D>
    where
        C: DataCube + ?Sized,
        F: Fn(ArrayView2<'_, f64>) -> f64 + Sync,
    {
        let scan = cube.shape().scan;
        if !self.parallel {
            return Ok(Array2::from_shape_fn(scan.dim(), |(rx, ry)| {
                reduce(cube.detector_slice(rx, ry))
            }));
        }
        let values: Vec<f64> = (0..scan.len())
            .into_par_iter()
            .map(|i| reduce(cube.detector_slice(i / scan.ny, i % scan.ny)))
            .collect();
        Array2::from_shape_vec(scan.dim(), values).map_err(|_| Error::ShapeMismatch {
            expected: scan.dim(),
            actual: (scan.len(), 1),
        })
    }
}

/// Virtual image with a default [`Aggregator`].
pub fn compute_virtual_image<C>(
    cube: &C,
    geometry: &GeometrySpec,
    mode: AggregationMode,
) -> Result<VirtualImage>
where
    C: DataCube + ?Sized,
{
    Aggregator::default().virtual_image(cube, geometry, mode)
}

/// Diffraction aggregate with a default [`Aggregator`].
pub fn compute_diffraction_aggregate<C>(
    cube: &C,
    geometry: &GeometrySpec,
    mode: AggregationMode,
) -> Result<DiffractionAggregate>
where
    C: DataCube + ?Sized,
{
    Aggregator::default().diffraction_aggregate(cube, geometry, mode)
}

fn ensure_non_empty(shape: PlaneShape) -> Result<()> {
    if shape.is_empty() {
        Err(Error::EmptyPlane {
            plane: shape.to_string(),
        })
    } else {
        Ok(())
    }
}

fn masked_sum(pattern: ArrayView2<'_, f64>, selected: &[(usize, usize)]) -> f64 {
    selected.iter().map(|&(qx, qy)| pattern[[qx, qy]]).sum()
}

/// Maximum over the selection; 0 for an empty selection.
fn masked_max(pattern: ArrayView2<'_, f64>, selected: &[(usize, usize)]) -> f64 {
    selected
        .iter()
        .map(|&(qx, qy)| pattern[[qx, qy]])
        .reduce(f64::max)
        .unwrap_or(0.0)
}
