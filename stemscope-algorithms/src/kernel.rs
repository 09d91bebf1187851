//! Correlation kernels built from a probe image.
//!
//! Every kernel starts from the probe normalized to unit sum and shifted so
//! that its origin sits at index `(0, 0)`, with wrap-around. The non-flat
//! modes then subtract a radial profile scaled to the kernel's own sum,
//! leaving a zero-sum kernel that suppresses smooth background under the
//! disks.
#![allow(clippy::cast_precision_loss)]

use std::f64::consts::PI;

use ndarray::Array2;
use rustfft::num_complex::Complex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stemscope_core::{Error, Field2D, KernelMode, Result};

use crate::fft::{fft2, fftshift, frequency, ifft2_real, wrapped};

/// Half-width of the window shown by [`Kernel::corner_window`] by default.
pub const DISPLAY_HALF_WIDTH: usize = 24;

/// Parameters of [`build_kernel`].
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KernelParams {
    /// Probe center in detector pixels; moved to index `(0, 0)`.
    pub origin: (f64, f64),
    /// Gaussian width, required by [`KernelMode::Gaussian`].
    pub sigma: Option<f64>,
    /// `(r_inner, r_outer)`, required by the sigmoid modes.
    pub radii: Option<(f64, f64)>,
    /// Shift with bilinear interpolation instead of a Fourier phase ramp.
    pub bilinear: bool,
}

impl KernelParams {
    /// Parameters for a probe centered at `origin`.
    #[must_use]
    pub fn new(origin: (f64, f64)) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    /// Set the probe origin.
    #[must_use]
    pub fn with_origin(mut self, origin: (f64, f64)) -> Self {
        self.origin = origin;
        self
    }

    /// Set the Gaussian width.
    #[must_use]
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// Set the sigmoid transition radii.
    #[must_use]
    pub fn with_radii(mut self, r_inner: f64, r_outer: f64) -> Self {
        self.radii = Some((r_inner, r_outer));
        self
    }

    /// Use bilinear interpolation for the origin shift.
    #[must_use]
    pub fn with_bilinear(mut self, bilinear: bool) -> Self {
        self.bilinear = bilinear;
        self
    }
}

/// A correlation kernel with its origin at index `(0, 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    data: Field2D,
    mode: KernelMode,
}

impl Kernel {
    /// Kernel values, origin at `(0, 0)`.
    #[must_use]
    pub fn data(&self) -> &Field2D {
        &self.data
    }

    /// Mode the kernel was built with.
    #[must_use]
    pub fn mode(&self) -> KernelMode {
        self.mode
    }

    /// Kernel with its origin moved to the array center.
    #[must_use]
    pub fn center_for_display(&self) -> Field2D {
        fftshift(&self.data)
    }

    /// The `2 * half_width` square around the origin, assembled from the
    /// four corners of the kernel. `half_width` is capped at the smaller
    /// kernel axis.
    #[must_use]
    pub fn corner_window(&self, half_width: usize) -> Field2D {
        let (nx, ny) = self.data.dim();
        let r = half_width.min(nx).min(ny);
        Array2::from_shape_fn((2 * r, 2 * r), |(i, j)| {
            self.data[[(i + nx - r) % nx, (j + ny - r) % ny]]
        })
    }
}

/// Build a correlation kernel from `probe` in the given mode.
pub fn build_kernel(probe: &Field2D, mode: KernelMode, params: &KernelParams) -> Result<Kernel> {
    let profile = RadialProfile::for_mode(mode, params)?;

    let (nx, ny) = probe.dim();
    if nx == 0 || ny == 0 {
        return Err(Error::EmptyPlane {
            plane: format!("{nx}x{ny}"),
        });
    }
    let total = probe.sum();
    if !total.is_finite() || total == 0.0 {
        return Err(Error::InvalidParameter(format!(
            "probe must have finite, non-zero total intensity (got {total})"
        )));
    }

    let normalized = probe / total;
    let (ox, oy) = params.origin;
    let mut data = if params.bilinear {
        shift_bilinear(&normalized, (-ox, -oy))
    } else {
        shift_fourier(&normalized, (-ox, -oy))
    };

    if let Some(profile) = profile {
        let trench = Array2::from_shape_fn((nx, ny), |(i, j)| {
            profile.value(wrapped(i, nx).hypot(wrapped(j, ny)))
        });
        let trench_sum = trench.sum();
        if trench_sum > 0.0 {
            let scale = data.sum() / trench_sum;
            data.zip_mut_with(&trench, |k, &t| *k -= t * scale);
        }
    }

    Ok(Kernel { data, mode })
}

#[derive(Debug, Clone, Copy)]
enum RadialProfile {
    Gaussian { sigma: f64 },
    Sigmoid { r_inner: f64, r_outer: f64 },
    SigmoidLog { r_inner: f64, r_outer: f64 },
}

impl RadialProfile {
    fn for_mode(mode: KernelMode, params: &KernelParams) -> Result<Option<Self>> {
        let radii = |mode: KernelMode| -> Result<(f64, f64)> {
            let (r_inner, r_outer) = params.radii.ok_or(Error::MissingParameter {
                mode: mode.as_str(),
                parameter: "radii",
            })?;
            if r_inner.is_finite() && r_outer.is_finite() && r_inner >= 0.0 && r_outer > r_inner {
                Ok((r_inner, r_outer))
            } else {
                Err(Error::InvalidParameter(format!(
                    "{mode} kernel needs 0 <= r_inner < r_outer, got ({r_inner}, {r_outer})"
                )))
            }
        };

        match mode {
            KernelMode::Flat => Ok(None),
            KernelMode::Gaussian => {
                let sigma = params.sigma.ok_or(Error::MissingParameter {
                    mode: mode.as_str(),
                    parameter: "sigma",
                })?;
                if sigma.is_finite() && sigma > 0.0 {
                    Ok(Some(Self::Gaussian { sigma }))
                } else {
                    Err(Error::InvalidParameter(format!(
                        "gaussian kernel needs sigma > 0, got {sigma}"
                    )))
                }
            }
            KernelMode::Sigmoid => {
                let (r_inner, r_outer) = radii(mode)?;
                Ok(Some(Self::Sigmoid { r_inner, r_outer }))
            }
            KernelMode::SigmoidLog => {
                let (r_inner, r_outer) = radii(mode)?;
                if r_inner <= 0.0 {
                    return Err(Error::InvalidParameter(format!(
                        "sigmoid_log kernel needs r_inner > 0, got {r_inner}"
                    )));
                }
                Ok(Some(Self::SigmoidLog { r_inner, r_outer }))
            }
        }
    }

    /// Profile value at radius `qr` from the origin.
    fn value(self, qr: f64) -> f64 {
        match self {
            Self::Gaussian { sigma } => (-(qr * qr) / (2.0 * sigma * sigma)).exp(),
            Self::Sigmoid { r_inner, r_outer } => cos2_step((qr - r_inner) / (r_outer - r_inner)),
            Self::SigmoidLog { r_inner, r_outer } => {
                if qr <= r_inner {
                    1.0
                } else {
                    cos2_step((qr / r_inner).ln() / (r_outer / r_inner).ln())
                }
            }
        }
    }
}

/// 1 below `t = 0`, 0 above `t = 1`, `cos^2(pi t / 2)` in between.
fn cos2_step(t: f64) -> f64 {
    if t <= 0.0 {
        1.0
    } else if t >= 1.0 {
        0.0
    } else {
        (0.5 * PI * t).cos().powi(2)
    }
}

/// Shift `field` by `(sx, sy)` with wrap-around: `out(r) = field(r - s)`.
fn shift_fourier(field: &Field2D, (sx, sy): (f64, f64)) -> Field2D {
    let (nx, ny) = field.dim();
    let mut spectrum = fft2(field);
    for ((i, j), value) in spectrum.indexed_iter_mut() {
        let phase = -2.0 * PI * (frequency(i, nx) * sx + frequency(j, ny) * sy);
        *value *= Complex::from_polar(1.0, phase);
    }
    ifft2_real(spectrum)
}

/// Bilinear counterpart of [`shift_fourier`].
fn shift_bilinear(field: &Field2D, (sx, sy): (f64, f64)) -> Field2D {
    let (nx, ny) = field.dim();
    let axis = |p: f64, n: usize| -> (usize, usize, f64) {
        let p = p.rem_euclid(n as f64);
        let base = p.floor();
        let frac = p - base;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i0 = (base as usize) % n;
        (i0, (i0 + 1) % n, frac)
    };
    Array2::from_shape_fn((nx, ny), |(x, y)| {
        let (x0, x1, fx) = axis(x as f64 - sx, nx);
        let (y0, y1, fy) = axis(y as f64 - sy, ny);
        field[[x0, y0]] * (1.0 - fx) * (1.0 - fy)
            + field[[x1, y0]] * fx * (1.0 - fy)
            + field[[x0, y1]] * (1.0 - fx) * fy
            + field[[x1, y1]] * fx * fy
    })
}
