//! Evidence fusion: weighted combination of classifier confidences.
//!
//! ```text
//! score   = w_image * image + w_audio * audio
//! decided = score >= alert_threshold
//! ```
//!
//! A classifier that is unavailable or errored contributes 0.0; fusion never
//! fails.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::FusionWeights;

/// Which classifier produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Image,
    Audio,
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// A single classifier confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierScore {
    pub source: ScoreSource,
    pub confidence: f64,
    /// False when the classifier (or the capture feeding it) failed.
    pub available: bool,
}

impl ClassifierScore {
    /// Build a score, clamping into `[0, 1]`. NaN becomes 0.0.
    pub fn new(source: ScoreSource, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            source,
            confidence,
            available: true,
        }
    }

    /// Score for a classifier that could not produce a result.
    pub fn unavailable(source: ScoreSource) -> Self {
        Self {
            source,
            confidence: 0.0,
            available: false,
        }
    }

    /// Collapse a fallible classifier outcome into a score.
    pub fn from_result<E>(source: ScoreSource, result: Result<f64, E>) -> Self {
        match result {
            Ok(confidence) => Self::new(source, confidence),
            Err(_) => Self::unavailable(source),
        }
    }
}

/// Derived alert decision. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub score: f64,
    pub decided: bool,
}

/// Fuse two confidences with the configured weights.
pub fn fuse(image_confidence: f64, audio_confidence: f64, weights: &FusionWeights) -> FusionResult {
    let score = weights.weight_image * image_confidence + weights.weight_audio * audio_confidence;
    FusionResult {
        score,
        decided: score >= weights.alert_threshold,
    }
}

/// Fuse classifier scores. Unavailable legs already carry 0.0.
pub fn fuse_scores(
    image: &ClassifierScore,
    audio: &ClassifierScore,
    weights: &FusionWeights,
) -> FusionResult {
    debug_assert_eq!(image.source, ScoreSource::Image);
    debug_assert_eq!(audio.source, ScoreSource::Audio);
    fuse(image.confidence, audio.confidence, weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_image_dominant_weights_decide() {
        let result = fuse(0.7, 0.0, &FusionWeights::new(0.9, 0.1, 0.6));
        assert!((result.score - 0.63).abs() < EPS);
        assert!(result.decided);
    }

    #[test]
    fn test_balanced_weights_below_threshold() {
        let result = fuse(0.6, 0.5, &FusionWeights::new(0.7, 0.3, 0.6));
        assert!((result.score - 0.57).abs() < EPS);
        assert!(!result.decided);
    }

    #[test]
    fn test_exact_threshold_decides() {
        let result = fuse(1.0, 0.0, &FusionWeights::new(0.6, 0.4, 0.6));
        assert!(result.decided);
    }

    #[test]
    fn test_unavailable_leg_contributes_zero() {
        let weights = FusionWeights::default();
        let image = ClassifierScore::new(ScoreSource::Image, 0.8);
        let audio = ClassifierScore::from_result::<&str>(ScoreSource::Audio, Err("model missing"));
        assert!(!audio.available);
        let result = fuse_scores(&image, &audio, &weights);
        assert!((result.score - 0.72).abs() < EPS);
        assert!(result.decided);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(ClassifierScore::new(ScoreSource::Image, 1.7).confidence, 1.0);
        assert_eq!(ClassifierScore::new(ScoreSource::Audio, -0.2).confidence, 0.0);
        assert_eq!(ClassifierScore::new(ScoreSource::Audio, f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_weights_not_normalized() {
        let result = fuse(1.0, 1.0, &FusionWeights::new(1.0, 1.0, 1.5));
        assert!((result.score - 2.0).abs() < EPS);
        assert!(result.decided);
    }

    #[test]
    fn test_monotone_in_each_input() {
        let weights = FusionWeights::new(0.7, 0.3, 0.6);
        let steps: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        for &fixed in &steps {
            let mut prev_image = f64::MIN;
            let mut prev_audio = f64::MIN;
            for &x in &steps {
                let by_image = fuse(x, fixed, &weights).score;
                let by_audio = fuse(fixed, x, &weights).score;
                assert!(by_image >= prev_image);
                assert!(by_audio >= prev_audio);
                prev_image = by_image;
                prev_audio = by_audio;
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let weights = FusionWeights::default();
        assert_eq!(fuse(0.42, 0.17, &weights), fuse(0.42, 0.17, &weights));
    }
}
