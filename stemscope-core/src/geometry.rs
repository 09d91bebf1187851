//! Detector and region-of-interest geometry.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::annulus::AnnulusConstraintSolver;
use crate::error::Error;
use crate::field::{clamp_range, Plane, PlaneShape};

/// Shape tag of a [`GeometrySpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeometryKind {
    Point,
    Rectangular,
    Circle,
    Annulus,
}

impl GeometryKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Rectangular => "Rectangular",
            Self::Circle => "Circle",
            Self::Annulus => "Annulus",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = Error;

    /// Parses menu-style labels; keyboard accelerator markers (`&`) are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('&', "").trim() {
            "Point" => Ok(Self::Point),
            "Rectangular" => Ok(Self::Rectangular),
            "Circle" => Ok(Self::Circle),
            "Annulus" => Ok(Self::Annulus),
            other => Err(Error::UnsupportedGeometry {
                geometry: other.to_string(),
                plane: "any".to_string(),
            }),
        }
    }
}

/// A detector or region of interest on one plane, in pixel units.
///
/// Pixel `(i, j)` has its center at coordinate `(i, j)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GeometrySpec {
    /// A single element.
    Point { x: f64, y: f64 },
    /// Half-open box `[x0, x0 + w) x [y0, y0 + h)`.
    Rectangular { x0: f64, y0: f64, w: f64, h: f64 },
    /// Disk of `radius` around `center`.
    Circle { center: (f64, f64), radius: f64 },
    /// Ring between `r_inner` and `r_outer` around `center`.
    Annulus {
        center: (f64, f64),
        r_inner: f64,
        r_outer: f64,
    },
}

impl GeometrySpec {
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point { .. } => GeometryKind::Point,
            Self::Rectangular { .. } => GeometryKind::Rectangular,
            Self::Circle { .. } => GeometryKind::Circle,
            Self::Annulus { .. } => GeometryKind::Annulus,
        }
    }

    /// Detector placed the way a freshly selected shape appears: centered on
    /// the plane with an extent of one tenth of it. The annulus outer ring
    /// is twice the inner one; the margin invariant is applied on top.
    #[must_use]
    pub fn default_for(kind: GeometryKind, shape: PlaneShape, margin: f64) -> Self {
        let (cx, cy) = shape.center();
        let xr = shape.nx as f64 / 10.0;
        let yr = shape.ny as f64 / 10.0;
        // Box corners and sizes land on whole pixels.
        let corner_x = (cx - xr / 2.0).trunc();
        let corner_y = (cy - yr / 2.0).trunc();
        let w = xr.trunc();
        let h = yr.trunc();

        match kind {
            GeometryKind::Point => Self::Point { x: cx, y: cy },
            GeometryKind::Rectangular => Self::Rectangular {
                x0: corner_x,
                y0: corner_y,
                w,
                h,
            },
            GeometryKind::Circle => Self::Circle {
                center: (corner_x + w / 2.0, corner_y + w / 2.0),
                radius: w / 2.0,
            },
            GeometryKind::Annulus => {
                let outer = (2.0 * xr).trunc();
                let outer_x = (cx - xr).trunc();
                let outer_y = (cy - yr).trunc();
                let center = (outer_x + outer / 2.0, outer_y + outer / 2.0);
                AnnulusConstraintSolver::new(center, w / 2.0, outer / 2.0, margin).into()
            }
        }
    }

    /// Translate the geometry by `(dx, dy)`. An annulus moves through its
    /// outer ring.
    #[must_use]
    pub fn nudged(self, dx: f64, dy: f64) -> Self {
        match self {
            Self::Point { x, y } => Self::Point {
                x: x + dx,
                y: y + dy,
            },
            Self::Rectangular { x0, y0, w, h } => Self::Rectangular {
                x0: x0 + dx,
                y0: y0 + dy,
                w,
                h,
            },
            Self::Circle { center, radius } => Self::Circle {
                center: (center.0 + dx, center.1 + dy),
                radius,
            },
            Self::Annulus {
                center,
                r_inner,
                r_outer,
            } => {
                // Translation preserves radii, so the margin is irrelevant here.
                let mut solver = AnnulusConstraintSolver::new(center, r_inner, r_outer, 0.0);
                solver.translate(dx, dy);
                solver.into()
            }
        }
    }

    /// Apply the annulus radius invariant with `margin`; other shapes are
    /// returned unchanged.
    #[must_use]
    pub fn settled(self, margin: f64) -> Self {
        match self {
            Self::Annulus {
                center,
                r_inner,
                r_outer,
            } => AnnulusConstraintSolver::new(center, r_inner, r_outer, margin).into(),
            other => other,
        }
    }

    /// Clamp the geometry's anchor coordinates into the plane.
    ///
    /// Points and centers are clamped to `[0, n - 1]`; rectangles are
    /// intersected with the plane. Radii are made non-negative.
    #[must_use]
    pub fn clamped(self, shape: PlaneShape) -> Self {
        let cx = |v: f64| clamp_coord(v, shape.nx);
        let cy = |v: f64| clamp_coord(v, shape.ny);
        match self {
            Self::Point { x, y } => Self::Point { x: cx(x), y: cy(y) },
            Self::Rectangular { .. } => {
                let (xs, ys) = self.pixel_ranges(shape).unwrap_or((0..0, 0..0));
                Self::Rectangular {
                    x0: xs.start as f64,
                    y0: ys.start as f64,
                    w: xs.len() as f64,
                    h: ys.len() as f64,
                }
            }
            Self::Circle { center, radius } => Self::Circle {
                center: (cx(center.0), cy(center.1)),
                radius: radius.max(0.0),
            },
            Self::Annulus {
                center,
                r_inner,
                r_outer,
            } => Self::Annulus {
                center: (cx(center.0), cy(center.1)),
                r_inner: r_inner.max(0.0),
                r_outer: r_outer.max(0.0),
            },
        }
    }

    /// Pixel ranges selected by a rectangle, clamped to the plane.
    ///
    /// `None` for non-rectangular geometry.
    #[must_use]
    pub fn pixel_ranges(&self, shape: PlaneShape) -> Option<(Range<usize>, Range<usize>)> {
        match *self {
            Self::Rectangular { x0, y0, w, h } => Some((
                clamp_range(x0, w, shape.nx),
                clamp_range(y0, h, shape.ny),
            )),
            _ => None,
        }
    }

    /// Human-readable provenance for an image computed with this geometry.
    #[must_use]
    pub fn describe(&self, plane: Plane, shape: PlaneShape) -> String {
        match (plane, *self) {
            (Plane::Detector, Self::Point { x, y }) => {
                let (xc, yc) = shape.clamp_point(x, y);
                format!("Diffraction Pixel: [{xc},{yc}]")
            }
            (Plane::Scan, Self::Point { x, y }) => {
                let (xc, yc) = shape.clamp_point(x, y);
                format!("Real Space Pixel: [{xc},{yc}]")
            }
            (_, Self::Rectangular { .. }) => {
                let (xs, ys) = self.pixel_ranges(shape).unwrap_or((0..0, 0..0));
                let prefix = match plane {
                    Plane::Detector => "Diffraction Space Range",
                    Plane::Scan => "Real Space Range",
                };
                format!(
                    "{prefix}: [{}:{},{}:{}]",
                    xs.start, xs.end, ys.start, ys.end
                )
            }
            (_, Self::Circle { center, radius }) => format!(
                "{}: ({:.0},{:.0}), Radius: {radius:.0}",
                center_prefix(plane),
                center.0,
                center.1
            ),
            (
                _,
                Self::Annulus {
                    center,
                    r_inner,
                    r_outer,
                },
            ) => format!(
                "{}: ({:.0},{:.0}), Radii: ({r_inner:.0},{r_outer:.0})",
                center_prefix(plane),
                center.0,
                center.1
            ),
        }
    }
}

impl From<AnnulusConstraintSolver> for GeometrySpec {
    fn from(solver: AnnulusConstraintSolver) -> Self {
        Self::Annulus {
            center: solver.center(),
            r_inner: solver.r_inner(),
            r_outer: solver.r_outer(),
        }
    }
}

fn center_prefix(plane: Plane) -> &'static str {
    match plane {
        Plane::Detector => "Detector Center",
        Plane::Scan => "Real Space Center",
    }
}

fn clamp_coord(value: f64, n: usize) -> f64 {
    let max = n.saturating_sub(1) as f64;
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("&Annulus".parse::<GeometryKind>().unwrap(), GeometryKind::Annulus);
        assert_eq!(" Point ".parse::<GeometryKind>().unwrap(), GeometryKind::Point);
        let err = "Hexagon".parse::<GeometryKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedGeometry { .. }));
    }

    #[test]
    fn test_default_placement() {
        let shape = PlaneShape::new(100, 100);
        match GeometrySpec::default_for(GeometryKind::Rectangular, shape, 3.0) {
            GeometrySpec::Rectangular { x0, y0, w, h } => {
                assert_eq!((x0, y0, w, h), (45.0, 45.0, 10.0, 10.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        match GeometrySpec::default_for(GeometryKind::Annulus, shape, 3.0) {
            GeometrySpec::Annulus {
                center,
                r_inner,
                r_outer,
            } => {
                assert_eq!(center, (50.0, 50.0));
                assert_eq!(r_inner, 5.0);
                assert_eq!(r_outer, 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_default_annulus_small_plane_respects_margin() {
        let geometry = GeometrySpec::default_for(GeometryKind::Annulus, PlaneShape::new(8, 8), 3.0);
        if let GeometrySpec::Annulus {
            r_inner, r_outer, ..
        } = geometry
        {
            assert!(r_outer >= r_inner + 3.0);
        } else {
            panic!("expected annulus");
        }
    }

    #[test]
    fn test_nudge_and_clamp() {
        let shape = PlaneShape::new(8, 8);
        let point = GeometrySpec::Point { x: 6.0, y: 1.0 }.nudged(5.0, -4.0);
        assert_eq!(point, GeometrySpec::Point { x: 11.0, y: -3.0 });
        assert_eq!(point.clamped(shape), GeometrySpec::Point { x: 7.0, y: 0.0 });

        let rect = GeometrySpec::Rectangular {
            x0: -2.0,
            y0: 5.0,
            w: 4.0,
            h: 10.0,
        };
        assert_eq!(
            rect.clamped(shape),
            GeometrySpec::Rectangular {
                x0: 0.0,
                y0: 5.0,
                w: 2.0,
                h: 3.0
            }
        );

        let ring = GeometrySpec::Annulus {
            center: (4.0, 4.0),
            r_inner: 1.0,
            r_outer: 5.0,
        }
        .nudged(1.0, 2.0);
        assert_eq!(
            ring,
            GeometrySpec::Annulus {
                center: (5.0, 6.0),
                r_inner: 1.0,
                r_outer: 5.0
            }
        );
    }

    #[test]
    fn test_settled_only_touches_annulus() {
        let ring = GeometrySpec::Annulus {
            center: (4.0, 4.0),
            r_inner: 6.0,
            r_outer: 2.0,
        }
        .settled(3.0);
        assert_eq!(
            ring,
            GeometrySpec::Annulus {
                center: (4.0, 4.0),
                r_inner: 6.0,
                r_outer: 15.0
            }
        );
        let circle = GeometrySpec::Circle {
            center: (1.0, 2.0),
            radius: 3.0,
        };
        assert_eq!(circle.settled(3.0), circle);
    }

    #[test]
    fn test_labels() {
        let shape = PlaneShape::new(16, 16);
        let rect = GeometrySpec::Rectangular {
            x0: 2.0,
            y0: 3.0,
            w: 4.0,
            h: 5.0,
        };
        assert_eq!(
            rect.describe(Plane::Detector, shape),
            "Diffraction Space Range: [2:6,3:8]"
        );
        assert_eq!(
            rect.describe(Plane::Scan, shape),
            "Real Space Range: [2:6,3:8]"
        );
        let point = GeometrySpec::Point { x: 20.0, y: 3.4 };
        assert_eq!(point.describe(Plane::Scan, shape), "Real Space Pixel: [15,3]");
        let circle = GeometrySpec::Circle {
            center: (8.0, 7.0),
            radius: 3.0,
        };
        assert_eq!(
            circle.describe(Plane::Detector, shape),
            "Detector Center: (8,7), Radius: 3"
        );
        let ring = GeometrySpec::Annulus {
            center: (8.0, 7.0),
            r_inner: 2.0,
            r_outer: 6.0,
        };
        assert_eq!(
            ring.describe(Plane::Detector, shape),
            "Detector Center: (8,7), Radii: (2,6)"
        );
    }
}
