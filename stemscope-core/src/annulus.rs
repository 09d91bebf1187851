//! Coupled inner/outer rings of an annular detector.
//!
//! Only the outer ring can be dragged. The inner ring's center is always
//! derived from the outer ring, and the coupling runs in one direction:
//! updates to the inner ring never move or resize the outer ring. After
//! every transition `r_outer >= r_inner + margin` holds.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default gap between inner and outer radius, in plane units.
pub const DEFAULT_ANNULUS_MARGIN: f64 = 3.0;

/// Axis-aligned bounding box of a ring: top-left corner and side length.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RingBounds {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl RingBounds {
    /// Radius of the ring this box encloses.
    #[inline]
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.size / 2.0
    }

    /// Center of the ring this box encloses.
    #[inline]
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        let r = self.radius();
        (self.x + r, self.y + r)
    }
}

/// Annulus state kept consistent across ring updates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnulusConstraintSolver {
    center: (f64, f64),
    r_inner: f64,
    r_outer: f64,
    margin: f64,
}

impl AnnulusConstraintSolver {
    /// Create a solver and settle the initial state.
    ///
    /// Negative or non-finite radii are treated as zero; a negative margin
    /// as zero.
    #[must_use]
    pub fn new(center: (f64, f64), r_inner: f64, r_outer: f64, margin: f64) -> Self {
        let mut solver = Self {
            center,
            r_inner: sanitize(r_inner),
            r_outer: sanitize(r_outer),
            margin: sanitize(margin),
        };
        solver.settle_outer();
        solver
    }

    /// Create a solver with [`DEFAULT_ANNULUS_MARGIN`].
    #[must_use]
    pub fn with_default_margin(center: (f64, f64), r_inner: f64, r_outer: f64) -> Self {
        Self::new(center, r_inner, r_outer, DEFAULT_ANNULUS_MARGIN)
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    #[inline]
    #[must_use]
    pub fn r_inner(&self) -> f64 {
        self.r_inner
    }

    #[inline]
    #[must_use]
    pub fn r_outer(&self) -> f64 {
        self.r_outer
    }

    #[inline]
    #[must_use]
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// The outer ring was dragged: its bounding box now starts at `(x, y)`.
    pub fn move_outer(&mut self, x: f64, y: f64) {
        self.center = (x + self.r_outer, y + self.r_outer);
    }

    /// The outer ring was moved or resized; `bounds` is its new box.
    ///
    /// The shared center is recomputed from the outer ring, then the outer
    /// radius is grown around that center if it violates the margin.
    pub fn update_outer(&mut self, bounds: RingBounds) {
        self.r_outer = sanitize(bounds.radius());
        self.center = bounds.center();
        self.settle_outer();
    }

    /// Resize the outer ring around the current center.
    pub fn set_outer_radius(&mut self, r_outer: f64) {
        self.r_outer = sanitize(r_outer);
        self.settle_outer();
    }

    /// Resize the inner ring. The radius is capped at `r_outer - margin`,
    /// the outer ring is left untouched.
    pub fn set_inner_radius(&mut self, r_inner: f64) {
        let cap = (self.r_outer - self.margin).max(0.0);
        self.r_inner = sanitize(r_inner).min(cap);
    }

    /// Translate the annulus by moving the outer ring.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        let outer = self.outer_bounds();
        self.move_outer(outer.x + dx, outer.y + dy);
    }

    /// Bounding box of the outer ring.
    #[must_use]
    pub fn outer_bounds(&self) -> RingBounds {
        bounds_around(self.center, self.r_outer)
    }

    /// Bounding box of the inner ring, concentric with the outer one.
    #[must_use]
    pub fn inner_bounds(&self) -> RingBounds {
        bounds_around(self.center, self.r_inner)
    }

    /// Whether the steady-state invariant holds.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.r_outer >= self.r_inner + self.margin
    }

    /// An outer ring pulled inside the inner one is grown to a radius of
    /// `2 * r_inner + margin`; one that only violates the margin is grown
    /// to `r_inner + margin`. The center is kept in both cases.
    ///
    /// `2 * r_inner + margin` is a radius here, not a ring diameter.
    fn settle_outer(&mut self) {
        if self.r_outer < self.r_inner {
            self.r_outer = 2.0 * self.r_inner + self.margin;
        } else if self.r_outer < self.r_inner + self.margin {
            self.r_outer = self.r_inner + self.margin;
        }
    }
}

fn bounds_around(center: (f64, f64), radius: f64) -> RingBounds {
    RingBounds {
        x: center.0 - radius,
        y: center.1 - radius,
        size: 2.0 * radius,
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
