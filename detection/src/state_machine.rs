//! Risk State Machine: debounced Normal/Risk/Confirmed episodes.
//!
//! The core is a pure transition function:
//!
//! ```text
//! (state, context, input) -> (state, context, [effects])
//! ```
//!
//! Effects (capture evidence, notify, relay to the dashboard) are returned as
//! data and executed by the runtime, so the machine itself never blocks and
//! can be driven deterministically in tests.
//!
//! ```text
//! Normal --n_risk risk readings--> Risk --fusion decided--> Confirmed
//!   ^                               |                          |
//!   +------n_recover calm readings--+                          |
//!   +------------------------operator reset--------------------+
//! ```
//!
//! [`RiskMachine`] owns the state and context, validates every state change
//! against the legal edges and keeps a transition log for diagnostics.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::events::{EpisodeId, RelayEvent};
use crate::evidence::Assessment;
use crate::policy::DetectionPolicy;
use crate::reading::SensorReading;

/// Detector states. Every run starts at `Normal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskState {
    #[default]
    Normal,
    Risk,
    /// Held until an operator reset.
    Confirmed,
}

impl RiskState {
    /// Label understood by the existing dashboard.
    pub fn dashboard_label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Risk => "riesgo",
            Self::Confirmed => "incendio confirmado",
        }
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Risk => write!(f, "Risk"),
            Self::Confirmed => write!(f, "Confirmed"),
        }
    }
}

/// Mutable episode bookkeeping, owned exclusively by the machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeContext {
    pub risk_streak: u32,
    pub normal_streak: u32,
    /// Set before the capture effect is emitted; at most once per episode.
    pub evidence_captured: bool,
    /// Notification attempted for this episode.
    pub alert_sent: bool,
    /// Outcome of the attempt, once known.
    pub alert_delivered: Option<bool>,
    /// Incremented on every Normal -> Risk entry. Survives resets.
    pub episode: EpisodeId,
    /// Latest evidence and verdict for the current episode.
    pub assessment: Option<Assessment>,
}

impl EpisodeContext {
    /// Zeroed context that keeps the episode counter.
    fn rearmed(&self) -> Self {
        Self {
            episode: self.episode,
            ..Self::default()
        }
    }
}

/// Everything the machine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Reading(SensorReading),
    /// Capture, classification and fusion finished for `episode`.
    FusionCompleted {
        episode: EpisodeId,
        assessment: Assessment,
    },
    /// Notification dispatch for `episode` finished.
    NotificationFinished { episode: EpisodeId, delivered: bool },
    /// Operator recovery signal.
    Reset,
}

/// Work the runtime must perform on the machine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CaptureEvidence {
        episode: EpisodeId,
        /// Humidity was below `h_min` on the triggering reading.
        low_humidity: bool,
    },
    Notify {
        episode: EpisodeId,
        assessment: Option<Assessment>,
    },
    Relay(RelayEvent),
}

/// Result of one pure transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: RiskState,
    pub context: EpisodeContext,
    pub effects: Vec<Effect>,
    pub reason: Option<&'static str>,
}

/// Pure transition function. Total over every (state, input) pair.
pub fn transition(
    state: RiskState,
    context: &EpisodeContext,
    input: &Input,
    policy: &DetectionPolicy,
) -> Step {
    let mut ctx = context.clone();
    let mut effects = Vec::new();
    let mut next = state;
    let mut reason = None;

    match input {
        Input::Reading(reading) => {
            effects.push(Effect::Relay(RelayEvent::reading(*reading)));
            let risk = policy.is_risk(reading);

            match state {
                RiskState::Normal => {
                    if risk {
                        ctx.risk_streak += 1;
                        tracing::debug!(
                            risk_streak = ctx.risk_streak,
                            n_risk = policy.n_risk,
                            "Risk reading"
                        );
                        if ctx.risk_streak >= policy.n_risk {
                            ctx.normal_streak = 0;
                            ctx.evidence_captured = false;
                            ctx.episode += 1;
                            next = RiskState::Risk;
                            reason = Some("risk streak reached");
                        }
                    } else {
                        ctx.risk_streak = 0;
                    }
                }
                RiskState::Risk => {
                    if !ctx.evidence_captured {
                        ctx.evidence_captured = true;
                        effects.push(Effect::CaptureEvidence {
                            episode: ctx.episode,
                            low_humidity: policy.is_dry(reading),
                        });
                    }

                    if risk {
                        ctx.normal_streak = 0;
                    } else {
                        ctx.normal_streak += 1;
                        tracing::debug!(
                            normal_streak = ctx.normal_streak,
                            n_recover = policy.n_recover,
                            "Calm reading"
                        );
                        if ctx.normal_streak >= policy.n_recover {
                            ctx = ctx.rearmed();
                            next = RiskState::Normal;
                            reason = Some("environment stabilized");
                        }
                    }
                }
                RiskState::Confirmed => {
                    if !ctx.alert_sent {
                        ctx.alert_sent = true;
                        effects.push(Effect::Notify {
                            episode: ctx.episode,
                            assessment: ctx.assessment.clone(),
                        });
                    }
                }
            }

            effects.push(Effect::Relay(RelayEvent::state(next, ctx.episode)));
        }

        Input::FusionCompleted {
            episode,
            assessment,
        } => {
            if state == RiskState::Risk && *episode == ctx.episode {
                ctx.assessment = Some(assessment.clone());
                effects.push(Effect::Relay(RelayEvent::evidence(
                    *episode,
                    assessment.clone(),
                )));
                if assessment.fusion.decided {
                    ctx.alert_sent = false;
                    ctx.alert_delivered = None;
                    next = RiskState::Confirmed;
                    reason = Some("fusion decided alert");
                    effects.push(Effect::Relay(RelayEvent::state(next, ctx.episode)));
                }
            } else {
                tracing::debug!(
                    episode,
                    current_episode = ctx.episode,
                    state = %state,
                    "Discarding stale fusion result"
                );
            }
        }

        Input::NotificationFinished { episode, delivered } => {
            if state == RiskState::Confirmed && *episode == ctx.episode {
                ctx.alert_delivered = Some(*delivered);
            }
        }

        Input::Reset => {
            ctx = ctx.rearmed();
            if state != RiskState::Normal {
                next = RiskState::Normal;
                reason = Some("operator reset");
            }
            effects.push(Effect::Relay(RelayEvent::state(next, ctx.episode)));
        }
    }

    Step {
        state: next,
        context: ctx,
        effects,
        reason,
    }
}

/// Legal edges of the state graph:
/// ```text
/// Normal -> Risk
/// Risk -> Normal | Confirmed
/// Confirmed -> Normal   (operator reset only)
/// ```
fn is_legal_transition(from: RiskState, to: RiskState) -> bool {
    use RiskState::*;

    matches!(
        (from, to),
        (Normal, Risk) | (Risk, Normal) | (Risk, Confirmed) | (Confirmed, Normal)
    )
}

/// A single recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RiskState,
    pub to: RiskState,
    /// Episode at the time of the transition (after increment on entry).
    pub episode: EpisodeId,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when a transition would leave the state graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: RiskState,
    pub to: RiskState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Most recent transitions kept by [`RiskMachine`]; older records are dropped.
pub const MAX_TRANSITION_HISTORY: usize = 256;

/// Owner of the detector state.
pub struct RiskMachine {
    state: RiskState,
    context: EpisodeContext,
    policy: DetectionPolicy,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
    total_transitions: u64,
}

impl RiskMachine {
    /// Start in `Normal` with a zeroed context.
    pub fn new(policy: DetectionPolicy) -> Self {
        Self {
            state: RiskState::Normal,
            context: EpisodeContext::default(),
            policy,
            created_at: Instant::now(),
            transitions: Vec::new(),
            total_transitions: 0,
        }
    }

    pub fn state(&self) -> RiskState {
        self.state
    }

    pub fn context(&self) -> &EpisodeContext {
        &self.context
    }

    pub fn policy(&self) -> &DetectionPolicy {
        &self.policy
    }

    /// Apply one input and return the effects to execute.
    ///
    /// On `Err` the machine is left untouched.
    pub fn apply(&mut self, input: &Input) -> Result<Vec<Effect>, IllegalTransition> {
        let step = transition(self.state, &self.context, input, &self.policy);

        if step.state != self.state {
            if !is_legal_transition(self.state, step.state) {
                return Err(IllegalTransition {
                    from: self.state,
                    to: step.state,
                });
            }

            tracing::info!(
                from = %self.state,
                to = %step.state,
                episode = step.context.episode,
                reason = step.reason.unwrap_or_default(),
                "State transition"
            );

            self.transitions.push(TransitionRecord {
                from: self.state,
                to: step.state,
                episode: step.context.episode,
                elapsed_ms: self.created_at.elapsed().as_millis() as u64,
                reason: step.reason.map(String::from),
            });
            self.total_transitions += 1;
            if self.transitions.len() > MAX_TRANSITION_HISTORY {
                let excess = self.transitions.len() - MAX_TRANSITION_HISTORY;
                self.transitions.drain(..excess);
            }
        }

        self.state = step.state;
        self.context = step.context;
        Ok(step.effects)
    }

    /// The last [`MAX_TRANSITION_HISTORY`] transitions, oldest first.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Transitions since start, including those dropped from the history.
    pub fn total_transitions(&self) -> u64 {
        self.total_transitions
    }

    /// One-line history, e.g. `Normal → Confirmed (1200ms, 2 transitions) [Risk → Confirmed]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({}ms, {} transitions)",
            RiskState::Normal,
            self.state,
            self.created_at.elapsed().as_millis(),
            self.total_transitions,
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}
