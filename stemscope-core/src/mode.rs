//! Aggregation, scaling, FFT-source and kernel mode tags.
//!
//! UI labels and configuration strings are parsed into these closed enums
//! once; the computation code matches on them exhaustively.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::field::Plane;

/// Smallest value passed to `log2` by logarithmic scaling.
pub const DEFAULT_LOG_FLOOR: f64 = 1e-6;

fn normalize_label(s: &str) -> String {
    s.replace('&', "").trim().to_string()
}

/// How a plane is reduced to one scalar per position of the other plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AggregationMode {
    /// Sum over the detector selection.
    Integrating,
    /// Maximum over the detector selection.
    Maximum,
    /// Magnitude of the mean-subtracted center-of-mass shift.
    CoMMagnitude,
    /// Direction of the mean-subtracted center-of-mass shift.
    CoMAngle,
    /// Phase integrated from the center-of-mass field.
    ICoM,
    /// Sum over the scan selection.
    Sum,
    /// Single scan position read directly.
    SinglePixel,
}

impl AggregationMode {
    /// The plane this mode reduces over.
    #[must_use]
    pub fn plane(self) -> Plane {
        match self {
            Self::Integrating | Self::Maximum | Self::CoMMagnitude | Self::CoMAngle | Self::ICoM => {
                Plane::Detector
            }
            Self::Sum | Self::SinglePixel => Plane::Scan,
        }
    }

    /// Whether the mode goes through the center-of-mass extractor.
    #[must_use]
    pub fn is_com(self) -> bool {
        matches!(self, Self::CoMMagnitude | Self::CoMAngle | Self::ICoM)
    }

    /// Scaling actually applied for display. Center-of-mass images are
    /// signed and always shown linearly.
    #[must_use]
    pub fn effective_scaling(self, requested: ScalingMode) -> ScalingMode {
        if self.is_com() {
            ScalingMode::Linear
        } else {
            requested
        }
    }

    /// Reject the mode if it does not reduce over `plane`.
    pub fn ensure_plane(self, plane: Plane) -> Result<Self, Error> {
        if self.plane() == plane {
            Ok(self)
        } else {
            Err(Error::UnsupportedAggregationMode {
                mode: self.to_string(),
                plane: plane.to_string(),
            })
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integrating => "Integrating",
            Self::Maximum => "Maximum",
            Self::CoMMagnitude => "CoM Magnitude",
            Self::CoMAngle => "CoM Angle",
            Self::ICoM => "iCoM",
            Self::Sum => "Sum",
            Self::SinglePixel => "Single Pixel",
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "Integrating" => Ok(Self::Integrating),
            "Maximum" => Ok(Self::Maximum),
            "CoM Magnitude" => Ok(Self::CoMMagnitude),
            "CoM Angle" => Ok(Self::CoMAngle),
            "iCoM" => Ok(Self::ICoM),
            "Sum" => Ok(Self::Sum),
            "Single Pixel" => Ok(Self::SinglePixel),
            other => Err(Error::UnsupportedAggregationMode {
                mode: other.to_string(),
                plane: "any".to_string(),
            }),
        }
    }
}

/// Display scaling law.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScalingMode {
    #[default]
    Linear,
    /// `log2(max(value, floor))`; `floor` must be positive.
    Log(f64),
    SquareRoot,
}

impl ScalingMode {
    /// Logarithmic scaling with [`DEFAULT_LOG_FLOOR`].
    #[must_use]
    pub fn log() -> Self {
        Self::Log(DEFAULT_LOG_FLOOR)
    }

    /// Logarithmic scaling with a custom floor.
    pub fn log_with_floor(floor: f64) -> Result<Self, Error> {
        if floor.is_finite() && floor > 0.0 {
            Ok(Self::Log(floor))
        } else {
            Err(Error::InvalidParameter(format!(
                "log floor must be positive and finite, got {floor}"
            )))
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("Linear"),
            Self::Log(_) => f.write_str("Log"),
            Self::SquareRoot => f.write_str("Square Root"),
        }
    }
}

impl FromStr for ScalingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "Linear" => Ok(Self::Linear),
            "Log" => Ok(Self::log()),
            "Square Root" => Ok(Self::SquareRoot),
            other => Err(Error::UnsupportedScalingMode(other.to_string())),
        }
    }
}

/// What the frequency-domain view is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FftSource {
    /// FFT magnitude of the displayed virtual image.
    Direct,
    /// Exit-wave power cepstrum of the diffraction aggregate.
    Ewpc,
}

impl FftSource {
    /// Title shown above the FFT view.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Direct => "Virtual Image FFT",
            Self::Ewpc => "EWPC",
        }
    }
}

impl fmt::Display for FftSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for FftSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "direct" | "Virtual Image FFT" => Ok(Self::Direct),
            "EWPC" | "ewpc" => Ok(Self::Ewpc),
            other => Err(Error::UnsupportedFftSource(other.to_string())),
        }
    }
}

/// Radial profile used to turn a probe into a correlation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KernelMode {
    Flat,
    Gaussian,
    Sigmoid,
    SigmoidLog,
}

impl KernelMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Gaussian => "gaussian",
            Self::Sigmoid => "sigmoid",
            Self::SigmoidLog => "sigmoid_log",
        }
    }
}

impl fmt::Display for KernelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "flat" => Ok(Self::Flat),
            "gaussian" => Ok(Self::Gaussian),
            "sigmoid" => Ok(Self::Sigmoid),
            "sigmoid_log" => Ok(Self::SigmoidLog),
            other => Err(Error::UnsupportedKernelMode(other.to_string())),
        }
    }
}
