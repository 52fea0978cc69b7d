//! Deterministic fire-detection core.
//!
//! This crate has no I/O. It provides:
//! - Telemetry normalization (`{temp, hum, luz}` or `{temp, hum, r, g, b}`)
//! - The debounced Normal/Risk/Confirmed state machine with its effects
//! - Weighted fusion of image and audio classifier confidences
//! - The relay event schema pushed to the dashboard
//! - Retry/backoff policy shared by the runtime adapters
//!
//! The runtime (`fire-sentinel`) owns a [`RiskMachine`], feeds it [`Input`]s
//! and executes the [`Effect`]s it returns.

pub mod events;
pub mod evidence;
pub mod fusion;
pub mod policy;
pub mod reading;
pub mod retry;
pub mod state_machine;

pub use events::{EpisodeId, RelayEvent};
pub use evidence::{Assessment, Evidence};
pub use fusion::{fuse, fuse_scores, ClassifierScore, FusionResult, ScoreSource};
pub use policy::{DetectionPolicy, FusionWeights, PolicyError};
pub use reading::{
    normalize, parse_inbound, ControlCommand, InboundMessage, InvalidReading, SensorReading,
};
pub use retry::RetryPolicy;
pub use state_machine::{
    transition, Effect, EpisodeContext, IllegalTransition, Input, RiskMachine, RiskState, Step,
    TransitionRecord,
};
