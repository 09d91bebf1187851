//! Phase reconstruction from a center-of-mass field.
//!
//! The iCoM image treats the center-of-mass shift as the gradient of a
//! scalar phase and integrates it. [`PhaseIntegrator`] is the seam for that
//! step; [`FourierIntegrator`] is the default.
#![allow(clippy::cast_precision_loss)]

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use stemscope_core::{Error, Field2D, Result};

use crate::fft::{fft2, frequency, ifft2_real};

/// Integrates a gradient field into a scalar phase on the same grid.
pub trait PhaseIntegrator: Send + Sync {
    /// Integrate `(com_x, com_y)`. The output must have the input shape.
    fn integrate(&self, com_x: &Field2D, com_y: &Field2D) -> Result<Field2D>;
}

impl<F> PhaseIntegrator for F
where
    F: Fn(&Field2D, &Field2D) -> Result<Field2D> + Send + Sync,
{
    fn integrate(&self, com_x: &Field2D, com_y: &Field2D) -> Result<Field2D> {
        self(com_x, com_y)
    }
}

/// One pass of Fourier-space gradient integration starting from zero phase.
///
/// With `kx`, `ky` the sample frequencies, the phase spectrum is
/// `(kx Gx + ky Gy) / (2 pi i (kx^2 + ky^2))`, scaled by `step_size`; the
/// zero-frequency term is set to zero, so the result has zero mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FourierIntegrator {
    /// Scale applied to the single update.
    pub step_size: f64,
}

impl Default for FourierIntegrator {
    fn default() -> Self {
        Self { step_size: 1.0 }
    }
}

impl FourierIntegrator {
    /// Create an integrator with unit step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step size.
    #[must_use]
    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }
}

impl PhaseIntegrator for FourierIntegrator {
    fn integrate(&self, com_x: &Field2D, com_y: &Field2D) -> Result<Field2D> {
        if com_x.dim() != com_y.dim() {
            return Err(Error::ShapeMismatch {
                expected: com_x.dim(),
                actual: com_y.dim(),
            });
        }
        let (nx, ny) = com_x.dim();
        if nx == 0 || ny == 0 {
            return Ok(com_x.clone());
        }

        let gx = fft2(com_x);
        let gy = fft2(com_y);
        let mut phase = gx;
        for ((i, j), value) in phase.indexed_iter_mut() {
            let kx = frequency(i, nx);
            let ky = frequency(j, ny);
            let k2 = kx * kx + ky * ky;
            *value = if k2 == 0.0 {
                Complex::new(0.0, 0.0)
            } else {
                let numerator = *value * kx + gy[[i, j]] * ky;
                numerator / Complex::new(0.0, 2.0 * PI * k2) * self.step_size
            };
        }
        Ok(ifft2_real(phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_recovers_periodic_phase() {
        let (nx, ny) = (16, 12);
        let wx = 2.0 * PI / nx as f64;
        let wy = 2.0 * 2.0 * PI / ny as f64;
        let phase = Array2::from_shape_fn((nx, ny), |(x, y)| {
            (wx * x as f64).sin() + 0.5 * (wy * y as f64).cos()
        });
        let gx = Array2::from_shape_fn((nx, ny), |(x, _)| wx * (wx * x as f64).cos());
        let gy = Array2::from_shape_fn((nx, ny), |(_, y)| -0.5 * wy * (wy * y as f64).sin());

        let recovered = FourierIntegrator::new().integrate(&gx, &gy).unwrap();
        assert_eq!(recovered.dim(), (nx, ny));
        for (a, b) in recovered.iter().zip(phase.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_gradient_gives_zero_phase() {
        let zeros = Array2::<f64>::zeros((5, 7));
        let phase = FourierIntegrator::new().integrate(&zeros, &zeros).unwrap();
        assert!(phase.iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f64>::zeros((4, 4));
        let b = Array2::<f64>::zeros((4, 5));
        assert!(matches!(
            FourierIntegrator::new().integrate(&a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_closure_integrator() {
        let integrator = |x: &Field2D, _: &Field2D| -> Result<Field2D> { Ok(x * 2.0) };
        let field = Array2::from_elem((2, 2), 1.5);
        let out = integrator.integrate(&field, &field).unwrap();
        assert_relative_eq!(out[[1, 1]], 3.0);
    }
}
