//! 2D FFT helpers over ndarray fields.
//!
//! Transforms run row-wise then column-wise with `rustfft` plans. Layout and
//! normalization follow the usual convention: the forward transform is
//! unnormalized, the inverse divides by `nx * ny`, and index 0 holds the zero
//! frequency.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{FftDirection, FftPlanner};

use stemscope_core::Field2D;

pub(crate) type ComplexField = Array2<Complex<f64>>;

/// Forward 2D FFT of a real field.
pub(crate) fn fft2(field: &Field2D) -> ComplexField {
    let mut data = field.mapv(|v| Complex::new(v, 0.0));
    transform(&mut data, FftDirection::Forward);
    data
}

/// Normalized inverse 2D FFT, in place.
pub(crate) fn ifft2_inplace(data: &mut ComplexField) {
    transform(data, FftDirection::Inverse);
    let n = data.len();
    if n > 0 {
        let scale = 1.0 / n as f64;
        data.mapv_inplace(|c| c * scale);
    }
}

/// Real part of the normalized inverse 2D FFT.
pub(crate) fn ifft2_real(mut data: ComplexField) -> Field2D {
    ifft2_inplace(&mut data);
    data.mapv(|c| c.re)
}

fn transform(data: &mut ComplexField, direction: FftDirection) {
    let (nx, ny) = data.dim();
    if nx == 0 || ny == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();

    // Rows are contiguous along y in standard layout.
    let mut rows: Vec<Complex<f64>> = data.iter().copied().collect();
    planner.plan_fft(ny, direction).process(&mut rows);

    // Transpose so columns become contiguous.
    let mut cols = vec![Complex::new(0.0, 0.0); nx * ny];
    for x in 0..nx {
        for y in 0..ny {
            cols[y * nx + x] = rows[x * ny + y];
        }
    }
    planner.plan_fft(nx, direction).process(&mut cols);

    for ((x, y), value) in data.indexed_iter_mut() {
        *value = cols[y * nx + x];
    }
}

/// Move the zero frequency from index 0 to the array center.
pub fn fftshift<T: Clone>(field: &Array2<T>) -> Array2<T> {
    let (nx, ny) = field.dim();
    let (sx, sy) = (nx / 2, ny / 2);
    Array2::from_shape_fn((nx, ny), |(x, y)| {
        field[[(x + nx - sx) % nx, (y + ny - sy) % ny]].clone()
    })
}

/// Inverse of [`fftshift`]: move the array center back to index 0.
pub fn ifftshift<T: Clone>(field: &Array2<T>) -> Array2<T> {
    let (nx, ny) = field.dim();
    let (sx, sy) = (nx / 2, ny / 2);
    Array2::from_shape_fn((nx, ny), |(x, y)| {
        field[[(x + sx) % nx, (y + sy) % ny]].clone()
    })
}

/// Signed integer frequency of index `i` on an axis of length `n`,
/// i.e. `i` wrapped into `[-n/2, n/2)`.
#[inline]
pub(crate) fn wrapped(i: usize, n: usize) -> f64 {
    ((i + n / 2) % n) as f64 - (n / 2) as f64
}

/// Sample frequency (cycles per pixel) of index `i` on an axis of length `n`.
#[inline]
pub(crate) fn frequency(i: usize, n: usize) -> f64 {
    wrapped(i, n) / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_fft2_of_constant_is_dc_only() {
        let field = Field2D::from_elem((4, 6), 2.0);
        let spectrum = fft2(&field);
        assert_relative_eq!(spectrum[[0, 0]].re, 48.0, epsilon = 1e-12);
        for ((x, y), c) in spectrum.indexed_iter() {
            if (x, y) != (0, 0) {
                assert!(c.norm() < 1e-12, "({x},{y}) = {c}");
            }
        }
    }

    #[test]
    fn test_inverse_roundtrip() {
        let field = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.5], [-1.0, 0.0, 2.0], [7.0, 1.0, 0.5]];
        let back = ifft2_real(fft2(&field));
        for (a, b) in field.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fftshift_odd_and_even() {
        let even = array![[0, 1, 2, 3]];
        assert_eq!(fftshift(&even), array![[2, 3, 0, 1]]);
        let odd = array![[0], [1], [2], [3], [4]];
        assert_eq!(fftshift(&odd), array![[3], [4], [0], [1], [2]]);
        assert_eq!(ifftshift(&fftshift(&odd)), odd);
    }

    #[test]
    fn test_wrapped_frequencies() {
        let even: Vec<f64> = (0..4).map(|i| wrapped(i, 4)).collect();
        assert_eq!(even, vec![0.0, 1.0, -2.0, -1.0]);
        let odd: Vec<f64> = (0..5).map(|i| wrapped(i, 5)).collect();
        assert_eq!(odd, vec![0.0, 1.0, 2.0, -2.0, -1.0]);
        assert_relative_eq!(frequency(1, 4), 0.25);
    }
}
