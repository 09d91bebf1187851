//! stemscope-algorithms: Reductions and analysis over 4D scan datasets.
//!
//! This crate provides the computations behind a virtual detector viewer:
//! - **Aggregation** - virtual images and diffraction aggregates through a
//!   detector or scan-plane geometry
//! - **Center of mass** - shift fields, their magnitude and angle, and
//!   integrated phase (iCoM)
//! - **Spectra** - direct FFT and EWPC views with display levels
//! - **Probes and kernels** - vacuum probe averaging, probe sizing and
//!   correlation kernels
//! - **Disk detection** - Bragg disk positions from kernel correlation
//! - **Processing** - recompute passes with stale-result suppression
//!
#![warn(missing_docs)]

mod aggregate;
mod com;
mod disks;
mod fft;
mod kernel;
mod phase;
mod probe;
mod processing;
pub mod spectrum;

pub use aggregate::{
    compute_diffraction_aggregate, compute_virtual_image, Aggregator, DiffractionAggregate,
    Reduction, VirtualImage,
};
pub use com::{centroid, ComField};
pub use disks::{
    detect_disks, BraggPeak, BraggPeakSet, CorrelationPeakFinder, DetectionParams,
    DiskAnnotation, DiskDetector, FourierCorrelator, Subpixel,
};
pub use fft::{fftshift, ifftshift};
pub use kernel::{build_kernel, Kernel, KernelParams, DISPLAY_HALF_WIDTH};
pub use phase::{FourierIntegrator, PhaseIntegrator};
pub use probe::{probe_size, Probe, VacuumProbeConfig};
pub use processing::{
    DiskRequest, Engine, PassResult, PassToken, RecomputeRequest, ScaledView,
};
pub use spectrum::{spectrum, Spectrum};

// Re-export the core data model
pub use stemscope_core::{
    AggregationMode, DataCube, EngineConfig, Error, FftSource, Field2D, GeometryKind,
    GeometrySpec, KernelMode, Mask, PlaneShape, Result, ScalingMode,
};
