//! Read-only access to a 4D scan dataset.
//!
//! The cube is indexed `(scan_x, scan_y, det_x, det_y)`. It is owned by the
//! hosting application; computations only ever borrow it.

use std::ops::Range;

use ndarray::{s, Array4, ArrayView2, ArrayView4};

use crate::field::{Plane, PlaneShape};

/// Shape of a 4D dataset split into its two planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeShape {
    pub scan: PlaneShape,
    pub detector: PlaneShape,
}

impl CubeShape {
    /// Shape of the given plane.
    #[inline]
    #[must_use]
    pub fn plane(&self, plane: Plane) -> PlaneShape {
        match plane {
            Plane::Scan => self.scan,
            Plane::Detector => self.detector,
        }
    }
}

/// Accessor over a 4D dataset.
///
/// Implementors only need to expose a 4D view; shape queries and slice
/// reads are derived from it.
pub trait DataCube: Sync {
    /// Borrow the whole dataset.
    fn view(&self) -> ArrayView4<'_, f64>;

    /// Shape of the scan and detector planes.
    fn shape(&self) -> CubeShape {
        let (rx, ry, qx, qy) = self.view().dim();
        CubeShape {
            scan: PlaneShape::new(rx, ry),
            detector: PlaneShape::new(qx, qy),
        }
    }

    /// Detector-plane image recorded at one scan position.
    fn detector_slice(&self, rx: usize, ry: usize) -> ArrayView2<'_, f64> {
        self.view().slice_move(s![rx, ry, .., ..])
    }

    /// Scan-plane image of one detector pixel.
    fn scan_slice(&self, qx: usize, qy: usize) -> ArrayView2<'_, f64> {
        self.view().slice_move(s![.., .., qx, qy])
    }

    /// Rectangular sub-block over the scan plane, all detector pixels.
    fn scan_block(&self, xs: Range<usize>, ys: Range<usize>) -> ArrayView4<'_, f64> {
        self.view().slice_move(s![xs, ys, .., ..])
    }
}

impl DataCube for Array4<f64> {
    fn view(&self) -> ArrayView4<'_, f64> {
        Array4::view(self)
    }
}

impl DataCube for ArrayView4<'_, f64> {
    fn view(&self) -> ArrayView4<'_, f64> {
        self.reborrow()
    }
}
