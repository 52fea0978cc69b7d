//! Thresholds and weights that parameterize detection.
//!
//! Nothing in the state machine or the fusion engine is hard-coded; both read
//! these structs. Defaults match the field deployment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::SensorReading;

/// Rejected policy values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("`{0}` must be at least 1")]
    ZeroStreak(&'static str),

    #[error("`{0}` must be a finite number")]
    NonFinite(&'static str),

    #[error("`{0}` must not be negative")]
    Negative(&'static str),
}

/// Hysteresis thresholds for the risk state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionPolicy {
    /// Temperature above which a reading is risk-qualifying (strict `>`).
    pub t_max: f64,
    /// Light level above which a reading is risk-qualifying (strict `>`).
    pub l_max: f64,
    /// Humidity below which conditions are logged as fire-favourable.
    pub h_min: f64,
    /// Consecutive risk readings needed to enter `Risk`.
    pub n_risk: u32,
    /// Consecutive non-risk readings needed to leave `Risk`.
    pub n_recover: u32,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            t_max: 45.0,
            l_max: 2000.0,
            h_min: 20.0,
            n_risk: 5,
            n_recover: 5,
        }
    }
}

impl DetectionPolicy {
    /// Whether a reading qualifies as risk. Both thresholds tripping at once
    /// still counts as a single qualifying reading.
    pub fn is_risk(&self, reading: &SensorReading) -> bool {
        reading.temperature > self.t_max || reading.light > self.l_max
    }

    /// Humidity is advisory only.
    pub fn is_dry(&self, reading: &SensorReading) -> bool {
        reading.humidity < self.h_min
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for (name, value) in [("t_max", self.t_max), ("l_max", self.l_max), ("h_min", self.h_min)] {
            if !value.is_finite() {
                return Err(PolicyError::NonFinite(name));
            }
        }
        if self.n_risk == 0 {
            return Err(PolicyError::ZeroStreak("n_risk"));
        }
        if self.n_recover == 0 {
            return Err(PolicyError::ZeroStreak("n_recover"));
        }
        Ok(())
    }
}

/// Weights and decision threshold for evidence fusion.
///
/// Weights are not required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub weight_image: f64,
    pub weight_audio: f64,
    pub alert_threshold: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            weight_image: 0.9,
            weight_audio: 0.1,
            alert_threshold: 0.6,
        }
    }
}

impl FusionWeights {
    pub fn new(weight_image: f64, weight_audio: f64, alert_threshold: f64) -> Self {
        Self {
            weight_image,
            weight_audio,
            alert_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for (name, value) in [
            ("weight_image", self.weight_image),
            ("weight_audio", self.weight_audio),
            ("alert_threshold", self.alert_threshold),
        ] {
            if !value.is_finite() {
                return Err(PolicyError::NonFinite(name));
            }
        }
        if self.weight_image < 0.0 {
            return Err(PolicyError::Negative("weight_image"));
        }
        if self.weight_audio < 0.0 {
            return Err(PolicyError::Negative("weight_audio"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(temperature: f64, light: f64) -> SensorReading {
        SensorReading::new(temperature, 50.0, light, Utc::now())
    }

    #[test]
    fn test_threshold_is_strict() {
        let policy = DetectionPolicy::default();
        assert!(!policy.is_risk(&reading(45.0, 100.0)));
        assert!(!policy.is_risk(&reading(20.0, 2000.0)));
        assert!(policy.is_risk(&reading(45.1, 100.0)));
        assert!(policy.is_risk(&reading(20.0, 2000.5)));
    }

    #[test]
    fn test_both_thresholds_is_still_risk() {
        assert!(DetectionPolicy::default().is_risk(&reading(60.0, 5000.0)));
    }

    #[test]
    fn test_dry_detection() {
        let policy = DetectionPolicy::default();
        let dry = SensorReading::new(20.0, 10.0, 0.0, Utc::now());
        assert!(policy.is_dry(&dry));
        assert!(!policy.is_dry(&reading(20.0, 0.0)));
    }

    #[test]
    fn test_zero_streak_rejected() {
        let policy = DetectionPolicy {
            n_recover: 0,
            ..Default::default()
        };
        assert_eq!(policy.validate(), Err(PolicyError::ZeroStreak("n_recover")));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = FusionWeights::new(-0.1, 0.5, 0.6);
        assert_eq!(weights.validate(), Err(PolicyError::Negative("weight_image")));
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let weights = FusionWeights::new(0.7, 0.3, f64::NAN);
        assert_eq!(
            weights.validate(),
            Err(PolicyError::NonFinite("alert_threshold"))
        );
    }

    #[test]
    fn test_partial_toml_like_defaults() {
        let policy: DetectionPolicy = serde_json::from_str(r#"{"t_max": 60}"#).unwrap();
        assert_eq!(policy.t_max, 60.0);
        assert_eq!(policy.n_risk, 5);
    }
}
