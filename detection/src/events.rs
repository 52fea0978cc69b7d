//! Relay events pushed to the live dashboard.
//!
//! Events are emitted by the state machine as data and delivered by the
//! runtime, fire-and-forget. Delivery failures never feed back into detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::Assessment;
use crate::reading::SensorReading;
use crate::state_machine::RiskState;

/// Episode counter value.
pub type EpisodeId = u64;

/// All events tapped from the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A validated reading entered the state machine.
    Reading {
        reading: SensorReading,
        timestamp: DateTime<Utc>,
    },

    /// State after a reading, a decided fusion or an operator reset.
    State {
        state: RiskState,
        episode: EpisodeId,
        timestamp: DateTime<Utc>,
    },

    /// Captured evidence and its fusion verdict.
    Evidence {
        episode: EpisodeId,
        assessment: Assessment,
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    pub fn reading(reading: SensorReading) -> Self {
        Self::Reading {
            reading,
            timestamp: Utc::now(),
        }
    }

    pub fn state(state: RiskState, episode: EpisodeId) -> Self {
        Self::State {
            state,
            episode,
            timestamp: Utc::now(),
        }
    }

    pub fn evidence(episode: EpisodeId, assessment: Assessment) -> Self {
        Self::Evidence {
            episode,
            assessment,
            timestamp: Utc::now(),
        }
    }

    /// Event type string for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Reading { .. } => "reading",
            Self::State { .. } => "state",
            Self::Evidence { .. } => "evidence",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Reading { timestamp, .. }
            | Self::State { timestamp, .. }
            | Self::Evidence { timestamp, .. } => *timestamp,
        }
    }
}
