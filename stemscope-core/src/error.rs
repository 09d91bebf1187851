//! Error types for stemscope-core.

use thiserror::Error;

/// Result type alias for stemscope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for stemscope operations.
///
/// Empty masks and out-of-range coordinates are not errors. An empty mask
/// reduces to a defined value and coordinates are clamped to the plane.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Geometry tag unknown, or geometry not usable on the requested plane.
    #[error("unsupported geometry `{geometry}` on the {plane} plane")]
    UnsupportedGeometry { geometry: String, plane: String },

    /// Aggregation mode unknown, or not defined for the requested plane.
    #[error("unsupported aggregation mode `{mode}` on the {plane} plane")]
    UnsupportedAggregationMode { mode: String, plane: String },

    /// Scaling mode tag unknown.
    #[error("unsupported scaling mode `{0}`")]
    UnsupportedScalingMode(String),

    /// Kernel mode tag unknown.
    #[error("unsupported kernel mode `{0}`")]
    UnsupportedKernelMode(String),

    /// FFT source tag unknown.
    #[error("unsupported FFT source `{0}`")]
    UnsupportedFftSource(String),

    /// A parameter required by the selected mode was not supplied.
    #[error("kernel mode `{mode}` requires parameter `{parameter}`")]
    MissingParameter {
        mode: &'static str,
        parameter: &'static str,
    },

    /// Two arrays that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A plane with a zero-length axis cannot be indexed.
    #[error("the {plane} plane has zero extent")]
    EmptyPlane { plane: String },

    /// Parameter present but outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
