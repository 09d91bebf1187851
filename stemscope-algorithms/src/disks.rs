//! Bragg disk detection.
//!
//! A diffraction pattern is cross-correlated with a probe kernel and the
//! local maxima of the correlation are filtered into a set of disk
//! positions. [`CorrelationPeakFinder`] is the seam for that step;
//! [`FourierCorrelator`] is the default.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::sync::Arc;

use log::trace;
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stemscope_core::{Error, Field2D, Result};

use crate::fft::{fft2, ifft2_real};
use crate::kernel::Kernel;

/// Sub-pixel refinement of correlation maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Subpixel {
    /// Integer pixel positions.
    None,
    /// Parabolic fit through the maximum and its axis neighbours.
    #[default]
    Poly,
}

/// Peak-finding parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectionParams {
    /// Exponent of the correlation magnitude: 1 is cross-correlation, 0 is
    /// phase correlation, values in between are hybrid.
    pub corr_power: f64,
    /// Gaussian smoothing of the correlation (pixels); 0 disables it.
    pub sigma: f64,
    /// Maxima closer than this to the pattern border are discarded.
    pub edge_boundary: usize,
    /// Minimum intensity relative to the reference peak.
    pub min_relative_intensity: f64,
    /// Intensities at or below this are discarded.
    pub min_absolute_intensity: f64,
    /// Rank (0 = brightest) of the reference peak for the relative filter.
    pub relative_to_peak: usize,
    /// Weaker peaks closer than this to a stronger one are discarded.
    pub min_peak_spacing: f64,
    /// Upper bound on the number of peaks; 0 means unbounded.
    pub max_num_peaks: usize,
    /// Sub-pixel refinement.
    pub subpixel: Subpixel,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            corr_power: 1.0,
            sigma: 0.0,
            edge_boundary: 20,
            min_relative_intensity: 0.005,
            min_absolute_intensity: 0.0,
            relative_to_peak: 0,
            min_peak_spacing: 60.0,
            max_num_peaks: 70,
            subpixel: Subpixel::Poly,
        }
    }
}

impl DetectionParams {
    /// Set the correlation power.
    #[must_use]
    pub fn with_corr_power(mut self, corr_power: f64) -> Self {
        self.corr_power = corr_power;
        self
    }

    /// Set the smoothing width.
    #[must_use]
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    /// Set the edge boundary.
    #[must_use]
    pub fn with_edge_boundary(mut self, edge_boundary: usize) -> Self {
        self.edge_boundary = edge_boundary;
        self
    }

    /// Set the relative intensity threshold.
    #[must_use]
    pub fn with_min_relative_intensity(mut self, value: f64) -> Self {
        self.min_relative_intensity = value;
        self
    }

    /// Set the absolute intensity threshold.
    #[must_use]
    pub fn with_min_absolute_intensity(mut self, value: f64) -> Self {
        self.min_absolute_intensity = value;
        self
    }

    /// Set the reference peak rank of the relative filter.
    #[must_use]
    pub fn with_relative_to_peak(mut self, rank: usize) -> Self {
        self.relative_to_peak = rank;
        self
    }

    /// Set the minimum spacing between peaks.
    #[must_use]
    pub fn with_min_peak_spacing(mut self, spacing: f64) -> Self {
        self.min_peak_spacing = spacing;
        self
    }

    /// Set the maximum number of peaks.
    #[must_use]
    pub fn with_max_num_peaks(mut self, max: usize) -> Self {
        self.max_num_peaks = max;
        self
    }

    /// Set the sub-pixel refinement.
    #[must_use]
    pub fn with_subpixel(mut self, subpixel: Subpixel) -> Self {
        self.subpixel = subpixel;
        self
    }
}

/// One detected disk.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BraggPeak {
    /// Position along the first detector axis.
    pub qx: f64,
    /// Position along the second detector axis.
    pub qy: f64,
    /// Correlation value at the peak.
    pub intensity: f64,
}

/// Circle to draw over a diffraction pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskAnnotation {
    /// Circle center in detector pixels.
    pub center: (f64, f64),
    /// Circle radius in detector pixels.
    pub radius: f64,
}

/// Detected disks, brightest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BraggPeakSet {
    peaks: Vec<BraggPeak>,
}

impl BraggPeakSet {
    /// Wrap peaks, ordering them by descending intensity.
    #[must_use]
    pub fn new(mut peaks: Vec<BraggPeak>) -> Self {
        peaks.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
        Self { peaks }
    }

    /// Number of peaks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// Whether no disk was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Peaks, brightest first.
    #[must_use]
    pub fn peaks(&self) -> &[BraggPeak] {
        &self.peaks
    }

    /// Iterate over the peaks.
    pub fn iter(&self) -> std::slice::Iter<'_, BraggPeak> {
        self.peaks.iter()
    }

    /// `(qx, qy)` of every peak.
    #[must_use]
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.peaks.iter().map(|p| (p.qx, p.qy)).collect()
    }

    /// One circle of `radius` per peak.
    #[must_use]
    pub fn annotations(&self, radius: f64) -> Vec<DiskAnnotation> {
        self.peaks
            .iter()
            .map(|p| DiskAnnotation {
                center: (p.qx, p.qy),
                radius,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a BraggPeakSet {
    type Item = &'a BraggPeak;
    type IntoIter = std::slice::Iter<'a, BraggPeak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}

/// Correlates a pattern with a kernel and locates the maxima.
pub trait CorrelationPeakFinder: Send + Sync {
    /// Peaks of the correlation of `pattern` with `kernel` (origin at
    /// index `(0, 0)`), in detector pixel coordinates.
    fn correlate_and_find_peaks(
        &self,
        pattern: &Field2D,
        kernel: &Field2D,
        params: &DetectionParams,
    ) -> Result<Vec<BraggPeak>>;
}

impl<F> CorrelationPeakFinder for F
where
    F: Fn(&Field2D, &Field2D, &DetectionParams) -> Result<Vec<BraggPeak>> + Send + Sync,
{
    fn correlate_and_find_peaks(
        &self,
        pattern: &Field2D,
        kernel: &Field2D,
        params: &DetectionParams,
    ) -> Result<Vec<BraggPeak>> {
        self(pattern, kernel, params)
    }
}

/// FFT-based hybrid correlation followed by local-maximum filtering.
#[derive(Debug, Clone, Copy, Default)]
pub struct FourierCorrelator;

impl FourierCorrelator {
    /// Correlation surface of `pattern` with `kernel`.
    ///
    /// Both must have the same shape.
    #[must_use]
    pub fn correlate(pattern: &Field2D, kernel: &Field2D, corr_power: f64) -> Field2D {
        let kernel_ft = fft2(kernel);
        let mut product = fft2(pattern);
        product.zip_mut_with(&kernel_ft, |p, k| *p *= k.conj());
        if (corr_power - 1.0).abs() > f64::EPSILON {
            product.mapv_inplace(|c| {
                let norm = c.norm();
                if norm > 0.0 {
                    c * (norm.powf(corr_power) / norm)
                } else {
                    c
                }
            });
        }
        ifft2_real(product)
    }
}

impl CorrelationPeakFinder for FourierCorrelator {
    fn correlate_and_find_peaks(
        &self,
        pattern: &Field2D,
        kernel: &Field2D,
        params: &DetectionParams,
    ) -> Result<Vec<BraggPeak>> {
        if pattern.dim() != kernel.dim() {
            return Err(Error::ShapeMismatch {
                expected: pattern.dim(),
                actual: kernel.dim(),
            });
        }
        if !params.sigma.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "smoothing sigma must be finite, got {}",
                params.sigma
            )));
        }
        let mut surface = Self::correlate(pattern, kernel, params.corr_power);
        if params.sigma > 0.0 {
            surface = gaussian_smooth(&surface, params.sigma);
        }
        Ok(find_maxima(&surface, params))
    }
}

/// Runs a [`CorrelationPeakFinder`] and packages the result.
#[derive(Clone)]
pub struct DiskDetector {
    finder: Arc<dyn CorrelationPeakFinder>,
}

impl Default for DiskDetector {
    fn default() -> Self {
        Self {
            finder: Arc::new(FourierCorrelator),
        }
    }
}

impl std::fmt::Debug for DiskDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskDetector").finish_non_exhaustive()
    }
}

impl DiskDetector {
    /// Detector backed by [`FourierCorrelator`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different peak finder.
    #[must_use]
    pub fn with_finder(mut self, finder: Arc<dyn CorrelationPeakFinder>) -> Self {
        self.finder = finder;
        self
    }

    /// Detect disks in `pattern` with `kernel`.
    pub fn detect(
        &self,
        pattern: &Field2D,
        kernel: &Kernel,
        params: &DetectionParams,
    ) -> Result<BraggPeakSet> {
        let peaks = self
            .finder
            .correlate_and_find_peaks(pattern, kernel.data(), params)?;
        trace!("detected {} Bragg disks", peaks.len());
        Ok(BraggPeakSet::new(peaks))
    }
}

/// Detect disks with the default [`DiskDetector`].
pub fn detect_disks(
    pattern: &Field2D,
    kernel: &Kernel,
    params: &DetectionParams,
) -> Result<BraggPeakSet> {
    DiskDetector::default().detect(pattern, kernel, params)
}

/// Filter the local maxima of `surface` into peaks, brightest first.
fn find_maxima(surface: &Field2D, params: &DetectionParams) -> Vec<BraggPeak> {
    let (nx, ny) = surface.dim();
    let eb = params.edge_boundary;
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for x in eb..nx.saturating_sub(eb) {
        for y in eb..ny.saturating_sub(eb) {
            if is_local_max(surface, x, y) {
                candidates.push((x, y, surface[[x, y]]));
            }
        }
    }
    trace!("{} local maxima before filtering", candidates.len());

    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
    candidates.retain(|c| c.2 > params.min_absolute_intensity);
    if let Some(reference) = candidates.get(params.relative_to_peak).map(|c| c.2) {
        let floor = params.min_relative_intensity * reference;
        candidates.retain(|c| c.2 >= floor);
    }

    let spacing2 = params.min_peak_spacing * params.min_peak_spacing;
    let mut kept: Vec<(usize, usize, f64)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let too_close = kept.iter().any(|k| {
            let dx = k.0 as f64 - candidate.0 as f64;
            let dy = k.1 as f64 - candidate.1 as f64;
            dx * dx + dy * dy < spacing2
        });
        if !too_close {
            kept.push(candidate);
        }
    }
    if params.max_num_peaks > 0 {
        kept.truncate(params.max_num_peaks);
    }

    kept.into_iter()
        .map(|(x, y, intensity)| {
            let (dx, dy) = match params.subpixel {
                Subpixel::None => (0.0, 0.0),
                Subpixel::Poly => parabolic_offset(surface, x, y),
            };
            BraggPeak {
                qx: x as f64 + dx,
                qy: y as f64 + dy,
                intensity,
            }
        })
        .collect()
}

/// Strictly greater than neighbours earlier in raster order, at least as
/// large as later ones. Plateaus yield their first element.
fn is_local_max(surface: &Field2D, x: usize, y: usize) -> bool {
    let (nx, ny) = surface.dim();
    let v = surface[[x, y]];
    for dx in -1_isize..=1 {
        for dy in -1_isize..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (px, py) = (x as isize + dx, y as isize + dy);
            if px < 0 || py < 0 || px >= nx as isize || py >= ny as isize {
                continue;
            }
            let n = surface[[px as usize, py as usize]];
            let earlier = dx < 0 || (dx == 0 && dy < 0);
            if (earlier && n >= v) || (!earlier && n > v) {
                return false;
            }
        }
    }
    true
}

fn parabolic_offset(surface: &Field2D, x: usize, y: usize) -> (f64, f64) {
    let (nx, ny) = surface.dim();
    let vertex = |a: f64, b: f64, c: f64| -> f64 {
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            ((a - c) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };
    let v = surface[[x, y]];
    let dx = if x > 0 && x + 1 < nx {
        vertex(surface[[x - 1, y]], v, surface[[x + 1, y]])
    } else {
        0.0
    };
    let dy = if y > 0 && y + 1 < ny {
        vertex(surface[[x, y - 1]], v, surface[[x, y + 1]])
    } else {
        0.0
    };
    (dx, dy)
}

/// Separable Gaussian filter truncated at four sigma, edges clamped.
/// The support never exceeds the larger field axis.
fn gaussian_smooth(field: &Field2D, sigma: f64) -> Field2D {
    let (nx, ny) = field.dim();
    let radius = (4.0 * sigma).ceil().min(nx.max(ny) as f64) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-((k * k) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    let weights: Vec<f64> = weights.iter().map(|w| w / total).collect();

    let blur = |src: &Field2D, along_x: bool| -> Field2D {
        Array2::from_shape_fn((nx, ny), |(x, y)| {
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let k = i as isize - radius;
                    let sample = if along_x {
                        src[[(x as isize + k).clamp(0, nx as isize - 1) as usize, y]]
                    } else {
                        src[[x, (y as isize + k).clamp(0, ny as isize - 1) as usize]]
                    };
                    w * sample
                })
                .sum()
        })
    };
    blur(&blur(field, true), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{build_kernel, KernelParams};
    use approx::assert_relative_eq;
    use stemscope_core::KernelMode;

    fn add_disk(field: &mut Field2D, center: (f64, f64), radius: f64, value: f64) {
        for ((x, y), v) in field.indexed_iter_mut() {
            let dx = x as f64 - center.0;
            let dy = y as f64 - center.1;
            if dx * dx + dy * dy <= radius * radius {
                *v += value;
            }
        }
    }

    fn setup() -> (Field2D, Kernel) {
        let mut probe = Array2::zeros((64, 64));
        add_disk(&mut probe, (32.0, 32.0), 3.0, 1.0);
        let kernel =
            build_kernel(&probe, KernelMode::Flat, &KernelParams::new((32.0, 32.0))).unwrap();

        let mut pattern = Array2::zeros((64, 64));
        add_disk(&mut pattern, (20.0, 20.0), 3.0, 1.0);
        add_disk(&mut pattern, (40.0, 36.0), 3.0, 2.0);
        (pattern, kernel)
    }

    fn params() -> DetectionParams {
        DetectionParams::default()
            .with_edge_boundary(4)
            .with_min_peak_spacing(8.0)
    }

    #[test]
    fn test_detects_two_disks_brightest_first() {
        let (pattern, kernel) = setup();
        let peaks = detect_disks(&pattern, &kernel, &params()).unwrap();
        assert_eq!(peaks.len(), 2);
        let first = peaks.peaks()[0];
        assert_relative_eq!(first.qx, 40.0, epsilon = 1e-6);
        assert_relative_eq!(first.qy, 36.0, epsilon = 1e-6);
        assert_relative_eq!(first.intensity, 2.0, epsilon = 1e-9);
        let second = peaks.peaks()[1];
        assert_relative_eq!(second.qx, 20.0, epsilon = 1e-6);
        assert_relative_eq!(second.qy, 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_filters() {
        let (pattern, kernel) = setup();
        let one = detect_disks(&pattern, &kernel, &params().with_max_num_peaks(1)).unwrap();
        assert_eq!(one.len(), 1);

        let bright = params().with_min_relative_intensity(0.6);
        assert_eq!(detect_disks(&pattern, &kernel, &bright).unwrap().len(), 1);

        let absolute = params().with_min_absolute_intensity(1.5);
        assert_eq!(detect_disks(&pattern, &kernel, &absolute).unwrap().len(), 1);

        // Only (40, 36) lies 21 px or more from every border.
        let edged = params().with_edge_boundary(21);
        let found = detect_disks(&pattern, &kernel, &edged).unwrap();
        assert_eq!(found.positions().len(), 1);
        assert_relative_eq!(found.peaks()[0].qx, 40.0, epsilon = 1e-6);

        let spaced = params().with_min_peak_spacing(40.0);
        assert_eq!(detect_disks(&pattern, &kernel, &spaced).unwrap().len(), 1);
    }

    #[test]
    fn test_smoothing_and_hybrid_correlation_keep_positions() {
        let (pattern, kernel) = setup();
        for p in [
            params().with_sigma(1.0),
            params().with_corr_power(0.5).with_max_num_peaks(2),
        ] {
            let peaks = detect_disks(&pattern, &kernel, &p).unwrap();
            let mut positions = peaks.positions();
            positions.sort_by(|a, b| a.0.total_cmp(&b.0));
            assert_eq!(positions.len(), 2);
            assert!((positions[0].0 - 20.0).abs() < 1.0 && (positions[0].1 - 20.0).abs() < 1.0);
            assert!((positions[1].0 - 40.0).abs() < 1.0 && (positions[1].1 - 36.0).abs() < 1.0);
        }
    }

    #[test]
    fn test_non_finite_sigma_rejected() {
        let (pattern, kernel) = setup();
        for sigma in [f64::INFINITY, f64::NAN] {
            let result = detect_disks(&pattern, &kernel, &params().with_sigma(sigma));
            assert!(matches!(result, Err(Error::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_huge_sigma_support_is_capped() {
        let field = Array2::from_shape_fn((6, 4), |(x, y)| (x * 4 + y) as f64);
        let smoothed = gaussian_smooth(&field, 1e12);
        assert_eq!(smoothed.dim(), (6, 4));
        assert!(smoothed.iter().all(|v| v.is_finite()));

        let (pattern, kernel) = setup();
        assert!(detect_disks(&pattern, &kernel, &params().with_sigma(1e12)).is_ok());
    }

    #[test]
    fn test_parabolic_refinement() {
        let mut surface = Array2::zeros((5, 5));
        // Samples of -(x - 2.25)^2 along x at x = 1, 2, 3.
        surface[[1, 2]] = -1.5625;
        surface[[2, 2]] = -0.0625;
        surface[[3, 2]] = -0.5625;
        surface[[2, 1]] = -1.0;
        surface[[2, 3]] = -1.0;
        let (dx, dy) = parabolic_offset(&surface, 2, 2);
        assert_relative_eq!(dx, 0.25, epsilon = 1e-12);
        assert_relative_eq!(dy, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_annotations_and_shape_check() {
        let set = BraggPeakSet::new(vec![
            BraggPeak {
                qx: 1.0,
                qy: 2.0,
                intensity: 0.5,
            },
            BraggPeak {
                qx: 3.0,
                qy: 4.0,
                intensity: 0.9,
            },
        ]);
        let circles = set.annotations(2.5);
        assert_eq!(circles.len(), 2);
        assert_eq!(circles[0].center, (3.0, 4.0));
        assert_relative_eq!(circles[0].radius, 2.5);

        let small = Array2::zeros((8, 8));
        let (_, kernel) = setup();
        assert!(matches!(
            detect_disks(&small, &kernel, &params()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_custom_finder() {
        let finder = |_: &Field2D, _: &Field2D, _: &DetectionParams| -> Result<Vec<BraggPeak>> {
            Ok(vec![BraggPeak {
                qx: 7.0,
                qy: 7.0,
                intensity: 1.0,
            }])
        };
        let detector = DiskDetector::new().with_finder(Arc::new(finder));
        let (pattern, kernel) = setup();
        let peaks = detector.detect(&pattern, &kernel, &params()).unwrap();
        assert_eq!(peaks.positions(), vec![(7.0, 7.0)]);
    }
}
