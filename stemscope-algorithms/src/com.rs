//! Center-of-mass shift fields.
//!
//! For every scan position the masked diffraction pattern is reduced to its
//! intensity-weighted centroid in detector pixel coordinates. Each component
//! is then mean-subtracted over the scan plane, so the returned field holds
//! shifts relative to the average beam position.
#![allow(clippy::cast_precision_loss)]

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use stemscope_core::{DataCube, Error, Field2D, Mask, Result};

/// Mean-subtracted center-of-mass components over the scan plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ComField {
    /// Shift along the first detector axis.
    pub x: Field2D,
    /// Shift along the second detector axis.
    pub y: Field2D,
}

impl ComField {
    /// Extract the field from `cube` using the detector selection `mask`.
    ///
    /// Positions whose masked intensity sums to zero contribute a zero
    /// centroid before mean subtraction.
    pub fn extract<C>(cube: &C, mask: &Mask, parallel: bool) -> Result<Self>
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

        let selected = mask.selected();
        let ny = shape.scan.ny;
        let centroid_at = |i: usize| centroid(cube.detector_slice(i / ny, i % ny), &selected);
        let centroids: Vec<(f64, f64)> = if parallel {
            (0..shape.scan.len()).into_par_iter().map(centroid_at).collect()
        } else {
            (0..shape.scan.len()).map(centroid_at).collect()
        };

        let (xs, ys): (Vec<f64>, Vec<f64>) = centroids.into_iter().unzip();
        let mut x = to_field(shape.scan.dim(), xs)?;
        let mut y = to_field(shape.scan.dim(), ys)?;
        subtract_mean(&mut x);
        subtract_mean(&mut y);
        Ok(Self { x, y })
    }

    /// `hypot(x, y)` per scan position.
    #[must_use]
    pub fn magnitude(&self) -> Field2D {
        ndarray::Zip::from(&self.x)
            .and(&self.y)
            .map_collect(|&x, &y| x.hypot(y))
    }

    /// `atan2(y, x)` per scan position, in radians.
    #[must_use]
    pub fn angle(&self) -> Field2D {
        ndarray::Zip::from(&self.x)
            .and(&self.y)
            .map_collect(|&x, &y| y.atan2(x))
    }
}

/// Intensity-weighted centroid of `pattern` over the `selected` pixels.
///
/// Returns `(0, 0)` when the selected intensity sums to zero.
#[must_use]
pub fn centroid(pattern: ArrayView2<'_, f64>, selected: &[(usize, usize)]) -> (f64, f64) {
    let mut total = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for &(qx, qy) in selected {
        let v = pattern[[qx, qy]];
        total += v;
        sx += v * qx as f64;
        sy += v * qy as f64;
    }
    if total == 0.0 {
        (0.0, 0.0)
    } else {
        (sx / total, sy / total)
    }
}

fn to_field(dim: (usize, usize), values: Vec<f64>) -> Result<Field2D> {
    let len = values.len();
    Array2::from_shape_vec(dim, values).map_err(|_| Error::ShapeMismatch {
        expected: dim,
        actual: (len, 1),
    })
}

fn subtract_mean(field: &mut Field2D) {
    if let Some(mean) = field.mean() {
        field.mapv_inplace(|v| v - mean);
    }
}
