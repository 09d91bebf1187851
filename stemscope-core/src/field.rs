//! Two-dimensional fields, planes and pixel-coordinate helpers.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::fmt;

use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Real-valued 2D array, indexed `[x, y]`.
pub type Field2D = Array2<f64>;

/// The two planes of a 4D scan dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Plane {
    /// Slow axes: probe positions (real space).
    Scan,
    /// Fast axes: detector pixels (diffraction space).
    Detector,
}

impl Plane {
    /// The plane a reduction over `self` leaves behind.
    #[must_use]
    pub fn complement(self) -> Self {
        match self {
            Self::Scan => Self::Detector,
            Self::Detector => Self::Scan,
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => f.write_str("scan"),
            Self::Detector => f.write_str("detector"),
        }
    }
}

/// Extent of a plane, `(nx, ny)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneShape {
    pub nx: usize,
    pub ny: usize,
}

impl PlaneShape {
    #[inline]
    #[must_use]
    pub fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny }
    }

    /// Number of elements in the plane.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// Shape as an ndarray dimension tuple.
    #[inline]
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Round a continuous coordinate pair to the nearest pixel, clamped
    /// into the plane.
    ///
    /// The plane must be non-empty.
    #[inline]
    #[must_use]
    pub fn clamp_point(&self, x: f64, y: f64) -> (usize, usize) {
        (clamp_index(x, self.nx), clamp_index(y, self.ny))
    }

    /// Geometric center in pixel coordinates.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.nx as f64 / 2.0, self.ny as f64 / 2.0)
    }
}

impl From<(usize, usize)> for PlaneShape {
    fn from((nx, ny): (usize, usize)) -> Self {
        Self { nx, ny }
    }
}

impl fmt::Display for PlaneShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.nx, self.ny)
    }
}

/// Round `value` to the nearest integer and clamp it to `[0, n - 1]`.
///
/// Non-finite input maps to 0. `n` must be non-zero.
#[inline]
#[must_use]
pub fn clamp_index(value: f64, n: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let max = n.saturating_sub(1);
    let rounded = value.round();
    if rounded >= max as f64 {
        max
    } else {
        rounded as usize
    }
}

/// Clamp a continuous half-open range `[start, start + extent)` to pixel
/// bounds `[0, n]`.
#[must_use]
pub fn clamp_range(start: f64, extent: f64, n: usize) -> std::ops::Range<usize> {
    let to_bound = |v: f64| -> usize {
        if !v.is_finite() || v <= 0.0 {
            0
        } else if v >= n as f64 {
            n
        } else {
            v.round() as usize
        }
    };
    let lo = to_bound(start);
    let hi = to_bound(start + extent.max(0.0));
    lo..hi.max(lo)
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in percent (`0.0..=100.0`). Returns `None` for empty input.
/// NaN values are ordered last.
#[must_use]
pub fn percentile<'a, I>(values: I, q: f64) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().copied().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Minimum over a field, ignoring NaN. Returns `None` for empty input.
#[must_use]
pub fn min_value<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    values
        .into_iter()
        .copied()
        .filter(|v| !v.is_nan())
        .reduce(f64::min)
}
