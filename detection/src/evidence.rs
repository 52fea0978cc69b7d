//! Evidence captured while an episode is in `Risk`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fusion::{fuse_scores, ClassifierScore, FusionResult};
use crate::policy::FusionWeights;

/// References to the most recently captured artifacts.
///
/// A leg whose capture failed is `None`. Exactly one live `Evidence` exists
/// per episode; a later capture replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub image_ref: Option<PathBuf>,
    pub audio_ref: Option<PathBuf>,
    pub captured_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(
        image_ref: Option<PathBuf>,
        audio_ref: Option<PathBuf>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            image_ref,
            audio_ref,
            captured_at,
        }
    }

    /// Both legs failed.
    pub fn is_empty(&self) -> bool {
        self.image_ref.is_none() && self.audio_ref.is_none()
    }

    /// Exactly one leg failed.
    pub fn is_partial(&self) -> bool {
        self.image_ref.is_some() != self.audio_ref.is_some()
    }
}

/// Evidence plus the classifier scores and the fusion verdict derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub evidence: Evidence,
    pub image: ClassifierScore,
    pub audio: ClassifierScore,
    pub fusion: FusionResult,
}

impl Assessment {
    pub fn new(
        evidence: Evidence,
        image: ClassifierScore,
        audio: ClassifierScore,
        weights: &FusionWeights,
    ) -> Self {
        let fusion = fuse_scores(&image, &audio, weights);
        Self {
            evidence,
            image,
            audio,
            fusion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::ScoreSource;

    #[test]
    fn test_partial_evidence() {
        let evidence = Evidence::new(Some("shot.jpg".into()), None, Utc::now());
        assert!(evidence.is_partial());
        assert!(!evidence.is_empty());
    }

    #[test]
    fn test_assessment_fuses_scores() {
        let evidence = Evidence::new(None, Some("clip.wav".into()), Utc::now());
        let assessment = Assessment::new(
            evidence,
            ClassifierScore::unavailable(ScoreSource::Image),
            ClassifierScore::new(ScoreSource::Audio, 0.9),
            &FusionWeights::default(),
        );
        assert!((assessment.fusion.score - 0.09).abs() < 1e-9);
        assert!(!assessment.fusion.decided);
    }
}
