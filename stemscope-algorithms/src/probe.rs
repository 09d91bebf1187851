//! Vacuum probe estimation.
//!
//! A probe is the average diffraction pattern over scan positions where the
//! beam passes through vacuum. Its radius and origin are estimated from the
//! area and centroid of thresholded masks swept over a range of relative
//! intensity levels.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::f64::consts::PI;

use log::debug;
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stemscope_core::{DataCube, Error, Field2D, KernelMode, Mask, PlaneShape, Result};

use crate::kernel::{build_kernel, Kernel, KernelParams};

/// Number of relative threshold levels swept when sizing a probe.
const SIZE_THRESHOLDS: usize = 100;
const SIZE_THRESHOLD_LOW: f64 = 0.01;
const SIZE_THRESHOLD_HIGH: f64 = 0.99;

/// Settings for averaging a vacuum probe.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VacuumProbeConfig {
    /// Pixels below `mask_threshold * max` of the averaged probe are zeroed.
    pub mask_threshold: f64,
}

impl Default for VacuumProbeConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 0.2,
        }
    }
}

impl VacuumProbeConfig {
    /// Set the relative background threshold.
    #[must_use]
    pub fn with_mask_threshold(mut self, threshold: f64) -> Self {
        self.mask_threshold = threshold;
        self
    }
}

/// Probe image with its estimated radius and origin (detector pixels).
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    image: Field2D,
    size: f64,
    origin: (f64, f64),
}

impl Probe {
    /// Wrap a probe image and estimate its size and origin.
    #[must_use]
    pub fn new(image: Field2D) -> Self {
        let (size, origin) = probe_size(&image);
        Self {
            image,
            size,
            origin,
        }
    }

    /// Average the patterns at the scan positions selected by `region`
    /// (every position when `None`) and zero the background.
    pub fn from_vacuum<C>(
        cube: &C,
        region: Option<&Mask>,
        config: &VacuumProbeConfig,
    ) -> Result<Self>
    where
        C: DataCube + ?Sized,
    {
        let shape = cube.shape();
        if shape.detector.is_empty() {
            return Err(Error::EmptyPlane {
                plane: shape.detector.to_string(),
            });
        }
        let positions: Vec<(usize, usize)> = match region {
            Some(mask) if mask.shape() != shape.scan => {
                return Err(Error::ShapeMismatch {
                    expected: shape.scan.dim(),
                    actual: mask.shape().dim(),
                })
            }
            Some(mask) => mask.selected(),
            None => Mask::full(shape.scan).selected(),
        };
        if positions.is_empty() {
            return Err(Error::InvalidParameter(
                "vacuum region selects no scan positions".to_string(),
            ));
        }

        let mut image = Array2::zeros(shape.detector.dim());
        for &(rx, ry) in &positions {
            image += &cube.detector_slice(rx, ry);
        }
        image /= positions.len() as f64;

        let peak = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let threshold = config.mask_threshold * peak;
        image.mapv_inplace(|v| if v < threshold { 0.0 } else { v });

        let probe = Self::new(image);
        debug!(
            "vacuum probe from {} positions: radius {:.2}, origin ({:.2}, {:.2})",
            positions.len(),
            probe.size,
            probe.origin.0,
            probe.origin.1
        );
        Ok(probe)
    }

    /// The probe image.
    #[must_use]
    pub fn image(&self) -> &Field2D {
        &self.image
    }

    /// Estimated probe radius in detector pixels.
    #[must_use]
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Estimated probe center in detector pixels.
    #[must_use]
    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Build a correlation kernel centered on this probe's origin.
    ///
    /// `params` supplies the mode-specific parameters; its origin is
    /// replaced by the probe origin.
    pub fn kernel(&self, mode: KernelMode, params: &KernelParams) -> Result<Kernel> {
        let params = params.clone().with_origin(self.origin);
        build_kernel(&self.image, mode, &params)
    }
}

/// Estimate the radius and center of a probe image.
///
/// The image is thresholded at 100 levels between 1% and 99% of its
/// maximum. Each level gives an equivalent radius `sqrt(area / pi)`. Levels
/// where the radius changes steeply (gradient below twice the median
/// gradient, or positive) are discarded; the radius is the mean over the
/// remaining levels and the center is the centroid of the mask at their
/// mean threshold.
///
/// An image with no positive pixels has radius 0 and the plane center as
/// origin.
#[must_use]
pub fn probe_size(image: &Field2D) -> (f64, (f64, f64)) {
    let shape = PlaneShape::from(image.dim());
    let fallback = (0.0, shape.center());
    let peak = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak.is_finite() && peak > 0.0) {
        return fallback;
    }

    let step = (SIZE_THRESHOLD_HIGH - SIZE_THRESHOLD_LOW) / (SIZE_THRESHOLDS - 1) as f64;
    let thresholds: Vec<f64> = (0..SIZE_THRESHOLDS)
        .map(|i| SIZE_THRESHOLD_LOW + step * i as f64)
        .collect();
    let radii: Vec<f64> = thresholds
        .iter()
        .map(|&t| {
            let area = image.iter().filter(|&&v| v > peak * t).count() as f64;
            (area / PI).sqrt()
        })
        .collect();

    let grad = gradient(&radii);
    let median_grad = median(&grad);
    let kept: Vec<usize> = (0..SIZE_THRESHOLDS)
        .filter(|&i| grad[i] <= 0.0 && grad[i] >= 2.0 * median_grad)
        .collect();
    if kept.is_empty() {
        return fallback;
    }

    let radius = kept.iter().map(|&i| radii[i]).sum::<f64>() / kept.len() as f64;
    let level = kept.iter().map(|&i| thresholds[i]).sum::<f64>() / kept.len() as f64;

    let mut total = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for ((x, y), &v) in image.indexed_iter() {
        if v > peak * level {
            total += v;
            sx += v * x as f64;
            sy += v * y as f64;
        }
    }
    if total > 0.0 {
        (radius, (sx / total, sy / total))
    } else {
        fallback
    }
}

/// Second-order central differences with one-sided ends.
fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    (0..n)
        .map(|i| match (i, n) {
            (_, 0 | 1) => 0.0,
            (0, _) => values[1] - values[0],
            (i, n) if i == n - 1 => values[n - 1] - values[n - 2],
            (i, _) => (values[i + 1] - values[i - 1]) / 2.0,
        })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    stemscope_core::field::percentile(values, 50.0).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array4;

    fn disk(shape: (usize, usize), center: (f64, f64), radius: f64) -> Field2D {
        Array2::from_shape_fn(shape, |(x, y)| {
            let dx = x as f64 - center.0;
            let dy = y as f64 - center.1;
            if dx * dx + dy * dy <= radius * radius {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_probe_size_of_disk() {
        let image = disk((32, 32), (14.0, 17.0), 5.0);
        let (radius, origin) = probe_size(&image);
        assert!((radius - 5.0).abs() < 0.3, "radius {radius}");
        assert_relative_eq!(origin.0, 14.0, epsilon = 1e-9);
        assert_relative_eq!(origin.1, 17.0, epsilon = 1e-9);
    }

    #[test]
    fn test_probe_size_of_blank_image() {
        let image = Array2::zeros((10, 6));
        assert_eq!(probe_size(&image), (0.0, (5.0, 3.0)));
    }

    #[test]
    fn test_gradient_matches_central_differences() {
        let g = gradient(&[1.0, 2.0, 4.0, 7.0]);
        assert_eq!(g, vec![1.0, 1.5, 2.5, 3.0]);
        assert!(gradient(&[]).is_empty());
        assert_eq!(gradient(&[3.0]), vec![0.0]);
    }

    #[test]
    fn test_vacuum_average_and_threshold() {
        let probe = disk((16, 16), (8.0, 8.0), 3.0);
        let cube = Array4::from_shape_fn((2, 2, 16, 16), |(rx, ry, qx, qy)| {
            // Uniform background of 0.05 plus a probe scaled by position.
            0.05 + (1 + rx + ry) as f64 * probe[[qx, qy]]
        });
        let region = Mask::from_array(ndarray::array![[true, false], [false, false]]);
        let vacuum =
            Probe::from_vacuum(&cube, Some(&region), &VacuumProbeConfig::default()).unwrap();
        assert_relative_eq!(vacuum.image()[[8, 8]], 1.05, epsilon = 1e-12);
        assert_relative_eq!(vacuum.image()[[0, 0]], 0.0);
        assert!((vacuum.size() - 3.0).abs() < 0.5);
        assert_relative_eq!(vacuum.origin().0, 8.0, epsilon = 1e-9);

        let all = Probe::from_vacuum(&cube, None, &VacuumProbeConfig::default()).unwrap();
        // Mean scale over the four positions is 2.
        assert_relative_eq!(all.image()[[8, 8]], 2.05, epsilon = 1e-12);
    }

    #[test]
    fn test_vacuum_region_errors() {
        let cube = Array4::<f64>::ones((2, 2, 4, 4));
        let empty = Mask::empty(PlaneShape::new(2, 2));
        assert!(matches!(
            Probe::from_vacuum(&cube, Some(&empty), &VacuumProbeConfig::default()),
            Err(Error::InvalidParameter(_))
        ));
        let wrong = Mask::full(PlaneShape::new(3, 2));
        assert!(matches!(
            Probe::from_vacuum(&cube, Some(&wrong), &VacuumProbeConfig::default()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
