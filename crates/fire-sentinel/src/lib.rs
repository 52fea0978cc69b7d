//! Fire Sentinel runtime
//!
//! Wires the deterministic [`detection`] core to the outside world:
//! - Configuration from TOML, `FIRE_*` environment variables and CLI flags
//! - Telemetry transports (MQTT subscription, NDJSON on stdin)
//! - Evidence capture from the field camera (still image + audio clip)
//! - Classifier adapters (external scoring programs)
//! - Fire alerts through a chat bot, with bounded retry
//! - Best-effort dashboard relay
//!
//! The [`detector::Detector`] actor owns the state machine and executes the
//! effects it emits.

pub mod capture;
pub mod classifiers;
pub mod config;
pub mod detector;
pub mod notifier;
pub mod relay;
pub mod transport;

pub use config::{ConfigError, SentinelConfig, TransportKind};
pub use detector::{Detector, DetectorReport, DetectorSettings, DetectorStats, Ports};
pub use transport::{LineSource, MqttSource, RawPayload, TelemetrySource, TransportError};
