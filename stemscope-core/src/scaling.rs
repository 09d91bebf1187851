//! Display scaling of scalar fields.
//!
//! Scaling is for display only. Raw aggregates must be kept alongside the
//! scaled field for any computation that needs physical values.

use crate::field::Field2D;
use crate::mode::ScalingMode;

/// Apply `mode` to a single value.
#[inline]
#[must_use]
pub fn scale_value(value: f64, mode: ScalingMode) -> f64 {
    match mode {
        ScalingMode::Linear => value,
        ScalingMode::Log(floor) => value.max(floor).log2(),
        ScalingMode::SquareRoot => value.max(0.0).sqrt(),
    }
}

/// Apply `mode` element-wise, returning a new field.
#[must_use]
pub fn scale(field: &Field2D, mode: ScalingMode) -> Field2D {
    match mode {
        ScalingMode::Linear => field.clone(),
        _ => field.mapv(|v| scale_value(v, mode)),
    }
}
