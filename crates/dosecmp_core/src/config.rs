//! Tolerances for gamma dose comparison

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables of a gamma analysis.
///
/// All values have clinical defaults (3 mm / 3 %, global normalization to the
/// reference maximum, no low-dose threshold, gamma clamped at 2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoseComparisonConfig {
    /// Distance-to-agreement search radius in millimetres
    pub dta_tolerance_mm: f64,
    /// Dose-difference criterion as a percentage of the normalization dose
    pub dose_difference_tolerance_percent: f64,
    /// Normalization dose in Gy; zero or negative uses the reference maximum
    pub reference_dose_gy: f64,
    /// Reference voxels below this percentage of the normalization dose are excluded
    pub analysis_threshold_percent: f64,
    /// Ceiling applied to stored gamma values
    pub maximum_gamma: f64,
}

impl Default for DoseComparisonConfig {
    fn default() -> Self {
        Self {
            dta_tolerance_mm: 3.0,
            dose_difference_tolerance_percent: 3.0,
            reference_dose_gy: 0.0,
            analysis_threshold_percent: 0.0,
            maximum_gamma: 2.0,
        }
    }
}

impl DoseComparisonConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dta_tolerance_mm(mut self, value: f64) -> Self {
        self.dta_tolerance_mm = value;
        self
    }

    #[must_use]
    pub fn with_dose_difference_tolerance_percent(mut self, value: f64) -> Self {
        self.dose_difference_tolerance_percent = value;
        self
    }

    #[must_use]
    pub fn with_reference_dose_gy(mut self, value: f64) -> Self {
        self.reference_dose_gy = value;
        self
    }

    #[must_use]
    pub fn with_analysis_threshold_percent(mut self, value: f64) -> Self {
        self.analysis_threshold_percent = value;
        self
    }

    #[must_use]
    pub fn with_maximum_gamma(mut self, value: f64) -> Self {
        self.maximum_gamma = value;
        self
    }

    /// Reject tolerances that would divide by zero in the gamma terms and NaN
    /// settings that would silently disable the threshold or the clamp
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerances = [
            ("DTA tolerance", self.dta_tolerance_mm),
            (
                "dose difference tolerance",
                self.dose_difference_tolerance_percent,
            ),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositiveTolerance { name, value });
            }
        }
        if self.analysis_threshold_percent.is_nan() {
            return Err(ConfigError::NotANumber {
                name: "analysis threshold",
            });
        }
        if self.maximum_gamma.is_nan() {
            return Err(ConfigError::NotANumber {
                name: "maximum gamma",
            });
        }
        Ok(())
    }

    /// Whether the normalization dose is taken from the reference volume
    #[must_use]
    pub fn uses_reference_maximum(&self) -> bool {
        self.reference_dose_gy.is_nan() || self.reference_dose_gy <= 0.0
    }

    /// Resolve the normalization dose, given the reference volume's maximum
    pub fn normalization_dose_gy(&self, reference_maximum_gy: f64) -> Result<f64, ConfigError> {
        let dose = if self.uses_reference_maximum() {
            reference_maximum_gy
        } else {
            self.reference_dose_gy
        };
        if !dose.is_finite() || dose <= 0.0 {
            return Err(ConfigError::NonPositiveNormalizationDose { value: dose });
        }
        Ok(dose)
    }
}
