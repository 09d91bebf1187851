//! Boolean selection masks built from detector geometry.
#![allow(clippy::cast_precision_loss)]

use ndarray::{s, Array2};

use crate::annulus::{AnnulusConstraintSolver, DEFAULT_ANNULUS_MARGIN};
use crate::error::{Error, Result};
use crate::field::PlaneShape;
use crate::geometry::GeometrySpec;

/// Boolean selection over one plane, indexed `[x, y]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    /// Mask with every element selected.
    #[must_use]
    pub fn full(shape: PlaneShape) -> Self {
        Self {
            data: Array2::from_elem(shape.dim(), true),
        }
    }

    /// Mask with nothing selected.
    #[must_use]
    pub fn empty(shape: PlaneShape) -> Self {
        Self {
            data: Array2::from_elem(shape.dim(), false),
        }
    }

    #[must_use]
    pub fn from_array(data: Array2<bool>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> PlaneShape {
        self.data.dim().into()
    }

    /// Number of selected elements.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data.get((x, y)).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn as_array(&self) -> &Array2<bool> {
        &self.data
    }

    /// Indices of the selected elements, row-major.
    #[must_use]
    pub fn selected(&self) -> Vec<(usize, usize)> {
        self.data
            .indexed_iter()
            .filter_map(|(idx, &v)| v.then_some(idx))
            .collect()
    }

    /// Mask as 0/1 weights.
    #[must_use]
    pub fn to_weights(&self) -> Array2<f64> {
        self.data.mapv(|v| if v { 1.0 } else { 0.0 })
    }
}

/// Turns a [`GeometrySpec`] into a [`Mask`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskBuilder {
    annulus_margin: f64,
}

impl Default for MaskBuilder {
    fn default() -> Self {
        Self {
            annulus_margin: DEFAULT_ANNULUS_MARGIN,
        }
    }
}

impl MaskBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the margin enforced between annulus radii before masking.
    #[must_use]
    pub fn with_annulus_margin(mut self, margin: f64) -> Self {
        self.annulus_margin = margin;
        self
    }

    /// Build the mask for `geometry` over a plane of `shape`.
    ///
    /// The geometry is clamped to the plane first, so an off-plane center
    /// selects around the nearest edge pixel. Returns `Ok(None)` for
    /// [`GeometrySpec::Point`]: callers read the single element directly at
    /// the rounded, clamped coordinate.
    pub fn build(&self, geometry: &GeometrySpec, shape: PlaneShape) -> Result<Option<Mask>> {
        if shape.is_empty() {
            return Err(Error::EmptyPlane {
                plane: shape.to_string(),
            });
        }

        let geometry = geometry.clamped(shape);
        let mask = match geometry {
            GeometrySpec::Point { .. } => return Ok(None),
            GeometrySpec::Rectangular { .. } => {
                let mut mask = Mask::empty(shape);
                if let Some((xs, ys)) = geometry.pixel_ranges(shape) {
                    mask.data.slice_mut(s![xs, ys]).fill(true);
                }
                mask
            }
            GeometrySpec::Circle { center, radius } => {
                let r2 = radius * radius;
                radial_mask(shape, center, |d2| d2 <= r2)
            }
            GeometrySpec::Annulus {
                center,
                r_inner,
                r_outer,
            } => {
                let solver =
                    AnnulusConstraintSolver::new(center, r_inner, r_outer, self.annulus_margin);
                let ri2 = solver.r_inner() * solver.r_inner();
                let ro2 = solver.r_outer() * solver.r_outer();
                radial_mask(shape, solver.center(), |d2| ri2 <= d2 && d2 <= ro2)
            }
        };
        Ok(Some(mask))
    }
}

/// Build a mask with the default annulus margin.
pub fn build_mask(geometry: &GeometrySpec, shape: PlaneShape) -> Result<Option<Mask>> {
    MaskBuilder::default().build(geometry, shape)
}

fn radial_mask(
    shape: PlaneShape,
    center: (f64, f64),
    select: impl Fn(f64) -> bool,
) -> Mask {
    let (x0, y0) = center;
    Mask {
        data: Array2::from_shape_fn(shape.dim(), |(x, y)| {
            let dx = x as f64 - x0;
            let dy = y as f64 - y0;
            select(dx * dx + dy * dy)
        }),
    }
}
