//! Transcription parameters

use serde::Serialize;

use crate::error::ControlError;

/// Noise floor as a fraction of sensitivity when only a sensitivity is given
pub const DEFAULT_NOISE_FLOOR_RATIO: f64 = 0.6;

/// Default extraction sensitivity
pub const DEFAULT_SENSITIVITY: f64 = 0.5;

/// User-tunable parameters for the transcription stage
///
/// Invariant: `0 < noise_floor < sensitivity < 1`. Only constructible through
/// [`SensitivityConfig::new`] or [`SensitivityConfig::from_sensitivity`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensitivityConfig {
    sensitivity: f64,
    noise_floor: f64,
}

impl SensitivityConfig {
    /// Validate and build a config
    pub fn new(sensitivity: f64, noise_floor: f64) -> Result<Self, ControlError> {
        if !sensitivity.is_finite() || !noise_floor.is_finite() {
            return Err(ControlError::Validation(format!(
                "sensitivity and noise floor must be finite (got {}, {})",
                sensitivity, noise_floor
            )));
        }
        if sensitivity <= 0.0 || sensitivity >= 1.0 {
            return Err(ControlError::Validation(format!(
                "sensitivity must be between 0 and 1 exclusive (got {})",
                sensitivity
            )));
        }
        if noise_floor <= 0.0 {
            return Err(ControlError::Validation(format!(
                "noise floor must be greater than 0 (got {})",
                noise_floor
            )));
        }
        if noise_floor >= sensitivity {
            return Err(ControlError::Validation(format!(
                "noise floor ({}) must be below sensitivity ({})",
                noise_floor, sensitivity
            )));
        }

        Ok(Self {
            sensitivity,
            noise_floor,
        })
    }

    /// Derive the noise floor from sensitivity with a fixed ratio
    pub fn from_sensitivity(sensitivity: f64, noise_floor_ratio: f64) -> Result<Self, ControlError> {
        if !(noise_floor_ratio > 0.0 && noise_floor_ratio < 1.0) {
            return Err(ControlError::Validation(format!(
                "noise floor ratio must be between 0 and 1 exclusive (got {})",
                noise_floor_ratio
            )));
        }
        Self::new(sensitivity, sensitivity * noise_floor_ratio)
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            noise_floor: DEFAULT_SENSITIVITY * DEFAULT_NOISE_FLOOR_RATIO,
        }
    }
}
