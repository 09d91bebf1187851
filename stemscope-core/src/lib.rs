//! stemscope-core: Core types for virtual detector imaging.
//!
//! This crate provides the data model shared by the stemscope pipeline:
//! read-only access to a 4D scan dataset, detector geometry, selection
//! masks, aggregation and scaling modes, and display scaling.
//!

pub mod annulus;
pub mod config;
pub mod cube;
pub mod error;
pub mod field;
pub mod geometry;
pub mod mask;
pub mod mode;
pub mod scaling;

pub use annulus::{AnnulusConstraintSolver, RingBounds, DEFAULT_ANNULUS_MARGIN};
pub use config::EngineConfig;
pub use cube::{CubeShape, DataCube};
pub use error::{Error, Result};
pub use field::{Field2D, Plane, PlaneShape};
pub use geometry::{GeometryKind, GeometrySpec};
pub use mask::{build_mask, Mask, MaskBuilder};
pub use mode::{AggregationMode, FftSource, KernelMode, ScalingMode, DEFAULT_LOG_FLOOR};
pub use scaling::{scale, scale_value};
