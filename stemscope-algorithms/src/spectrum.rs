//! Frequency-domain views of a virtual image or diffraction aggregate.
//!
//! The direct view is the square root of the centered FFT magnitude of an
//! image. The EWPC view (exit-wave power cepstrum) is the centered FFT
//! magnitude of the logarithm of a diffraction pattern, clipped from below
//! so the logarithm stays finite.

use stemscope_core::field::percentile;
use stemscope_core::{FftSource, Field2D};

use crate::fft::{fft2, fftshift};

/// Upper display percentile of a spectrum.
pub const DISPLAY_PERCENTILE: f64 = 99.9;
/// Percentile of the non-negative pattern used as the EWPC clip value.
pub const EWPC_CLIP_PERCENTILE: f64 = 0.1;
/// Lower bound of the EWPC clip value.
pub const EWPC_MIN_CLIP: f64 = 1e-10;

/// Centered FFT magnitude plus display levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Magnitude with the zero frequency at the array center.
    pub magnitude: Field2D,
    /// `(min, 99.9th percentile)` of `magnitude`.
    pub levels: (f64, f64),
    /// What the spectrum was computed from.
    pub source: FftSource,
}

impl Spectrum {
    /// View title.
    #[must_use]
    pub fn title(&self) -> &'static str {
        self.source.title()
    }
}

/// Compute the frequency-domain view of `field`.
///
/// For [`FftSource::Direct`] the field is the displayed virtual image; for
/// [`FftSource::Ewpc`] it is the raw diffraction aggregate.
#[must_use]
pub fn spectrum(field: &Field2D, source: FftSource) -> Spectrum {
    let magnitude = match source {
        FftSource::Direct => centered_magnitude(field).mapv_into(f64::sqrt),
        FftSource::Ewpc => {
            let clip = ewpc_clip(field);
            let logged = field.mapv(|v| v.max(clip).ln());
            centered_magnitude(&logged)
        }
    };
    let levels = display_levels(&magnitude);
    Spectrum {
        magnitude,
        levels,
        source,
    }
}

/// `(min, 99.9th percentile)` of a field; `(0, 0)` when it is empty.
#[must_use]
pub fn display_levels(field: &Field2D) -> (f64, f64) {
    let low = stemscope_core::field::min_value(field).unwrap_or(0.0);
    let high = percentile(field, DISPLAY_PERCENTILE).unwrap_or(low);
    (low, high)
}

/// Clip value for the EWPC logarithm.
#[must_use]
pub fn ewpc_clip(pattern: &Field2D) -> f64 {
    let positive = pattern.mapv(|v| v.max(0.0));
    percentile(&positive, EWPC_CLIP_PERCENTILE)
        .unwrap_or(EWPC_MIN_CLIP)
        .max(EWPC_MIN_CLIP)
}

fn centered_magnitude(field: &Field2D) -> Field2D {
    fftshift(&fft2(field).mapv(|c| c.norm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_direct_constant_image() {
        let image = Array2::from_elem((4, 4), 1.0);
        let view = spectrum(&image, FftSource::Direct);
        // DC = 16, sqrt -> 4, centered at (2, 2).
        assert_relative_eq!(view.magnitude[[2, 2]], 4.0, epsilon = 1e-9);
        assert_relative_eq!(view.magnitude.sum(), 4.0, epsilon = 1e-6);
        assert_relative_eq!(view.levels.0, 0.0, epsilon = 1e-6);
        // 99.9th percentile of fifteen zeros and one 4: rank 14.985.
        assert_relative_eq!(view.levels.1, 3.94, epsilon = 1e-6);
        assert_eq!(view.title(), "Virtual Image FFT");
    }

    #[test]
    fn test_ewpc_of_unit_pattern_is_zero() {
        let pattern = Array2::from_elem((6, 6), 1.0);
        let view = spectrum(&pattern, FftSource::Ewpc);
        assert!(view.magnitude.iter().all(|v| v.abs() < 1e-9));
        assert_eq!(view.title(), "EWPC");
    }

    #[test]
    fn test_ewpc_is_finite_with_zeros_and_negatives() {
        let mut pattern = Array2::from_shape_fn((8, 8), |(x, y)| (x * 8 + y) as f64);
        pattern[[0, 0]] = 0.0;
        pattern[[1, 1]] = -3.0;
        let view = spectrum(&pattern, FftSource::Ewpc);
        assert!(view.magnitude.iter().all(|v| v.is_finite()));
        assert!(view.levels.0 <= view.levels.1);
    }

    #[test]
    fn test_ewpc_clip_floor() {
        let zeros = Array2::zeros((3, 3));
        assert_relative_eq!(ewpc_clip(&zeros), EWPC_MIN_CLIP);
        let ramp = Array2::from_shape_fn((10, 10), |(x, y)| 1.0 + (x * 10 + y) as f64);
        // rank = 0.001 * 99 = 0.099 between 1 and 2.
        assert_relative_eq!(ewpc_clip(&ramp), 1.099, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_field_levels() {
        let empty = Array2::<f64>::zeros((0, 4));
        assert_eq!(display_levels(&empty), (0.0, 0.0));
    }
}
