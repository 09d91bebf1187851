//! Engine configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::annulus::DEFAULT_ANNULUS_MARGIN;
use crate::mode::{FftSource, ScalingMode, DEFAULT_LOG_FLOOR};

/// Settings shared by every recompute pass.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Floor applied before `log2` when a view uses logarithmic scaling.
    pub log_floor: f64,
    /// Minimum gap between annulus radii (plane units).
    pub annulus_margin: f64,
    /// Source of the frequency-domain view; `None` disables it.
    pub fft_source: Option<FftSource>,
    /// Reduce scan positions in parallel.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_floor: DEFAULT_LOG_FLOOR,
            annulus_margin: DEFAULT_ANNULUS_MARGIN,
            fft_source: Some(FftSource::Direct),
            parallel: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logarithmic scaling floor.
    #[must_use]
    pub fn with_log_floor(mut self, floor: f64) -> Self {
        self.log_floor = floor;
        self
    }

    /// Set the annulus margin.
    #[must_use]
    pub fn with_annulus_margin(mut self, margin: f64) -> Self {
        self.annulus_margin = margin;
        self
    }

    /// Set (or disable) the FFT view source.
    #[must_use]
    pub fn with_fft_source(mut self, source: Option<FftSource>) -> Self {
        self.fft_source = source;
        self
    }

    /// Enable or disable parallel reduction.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Replace the floor of a logarithmic scaling with the configured one.
    #[must_use]
    pub fn resolve_scaling(&self, mode: ScalingMode) -> ScalingMode {
        match mode {
            ScalingMode::Log(_) => ScalingMode::Log(self.log_floor),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_log_floor(1e-3)
            .with_annulus_margin(5.0)
            .with_fft_source(Some(FftSource::Ewpc))
            .with_parallel(false);

        assert!((config.log_floor - 1e-3).abs() < f64::EPSILON);
        assert!((config.annulus_margin - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.fft_source, Some(FftSource::Ewpc));
        assert!(!config.parallel);
    }

    #[test]
    fn test_resolve_scaling() {
        let config = EngineConfig::default().with_log_floor(0.25);
        assert_eq!(config.resolve_scaling(ScalingMode::log()), ScalingMode::Log(0.25));
        assert_eq!(
            config.resolve_scaling(ScalingMode::SquareRoot),
            ScalingMode::SquareRoot
        );
    }
}
