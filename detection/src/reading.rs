//! Telemetry ingestion. Turns raw sensor payloads into canonical readings.
//!
//! The edge sensor publishes one of two JSON shapes:
//!
//! ```text
//! { "temp": 51.2, "hum": 18.0, "luz": 2400 }
//! { "temp": 51.2, "hum": 18.0, "r": 900, "g": 850, "b": 700 }
//! ```
//!
//! Both collapse into a [`SensorReading`] whose `light` is either the direct
//! value or the sum of the RGB channels. Operators can also publish
//! `{"command": "reset"}` on the same stream; [`parse_inbound`] separates
//! those from telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validated, immutable telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Direct light level, or r+g+b when the sensor reports color channels.
    pub light: f64,
    /// When the runtime received the payload.
    pub received_at: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(temperature: f64, humidity: f64, light: f64, received_at: DateTime<Utc>) -> Self {
        Self {
            temperature,
            humidity,
            light,
            received_at,
        }
    }
}

/// Reasons a payload is rejected before it reaches the state machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidReading {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Missing light: expected `luz` or all of `r`, `g`, `b`")]
    MissingLight,

    #[error("Non-finite value in `{0}`")]
    NonFinite(&'static str),

    #[error("Unknown command `{0}`")]
    UnknownCommand(String),
}

/// Wire shape of a telemetry message. Every field is optional so that
/// missing fields surface as [`InvalidReading`] rather than a serde error.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawTelemetry {
    temp: Option<f64>,
    hum: Option<f64>,
    luz: Option<f64>,
    r: Option<f64>,
    g: Option<f64>,
    b: Option<f64>,
}

/// Operator commands accepted on the telemetry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Return the detector to `Normal` from any state.
    Reset,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Telemetry(SensorReading),
    Control(ControlCommand),
}

fn required(value: Option<f64>, field: &'static str) -> Result<f64, InvalidReading> {
    let value = value.ok_or(InvalidReading::MissingField(field))?;
    if !value.is_finite() {
        return Err(InvalidReading::NonFinite(field));
    }
    Ok(value)
}

fn canonicalize(
    raw: RawTelemetry,
    received_at: DateTime<Utc>,
) -> Result<SensorReading, InvalidReading> {
    let temperature = required(raw.temp, "temp")?;
    let humidity = required(raw.hum, "hum")?;

    // `luz` wins when a sensor sends both shapes.
    let light = match (raw.luz, raw.r, raw.g, raw.b) {
        (Some(luz), _, _, _) => required(Some(luz), "luz")?,
        (None, Some(r), Some(g), Some(b)) => {
            required(Some(r), "r")? + required(Some(g), "g")? + required(Some(b), "b")?
        }
        _ => return Err(InvalidReading::MissingLight),
    };

    Ok(SensorReading::new(temperature, humidity, light, received_at))
}

/// Normalize a raw telemetry payload into a [`SensorReading`].
pub fn normalize(payload: &[u8], received_at: DateTime<Utc>) -> Result<SensorReading, InvalidReading> {
    let raw: RawTelemetry =
        serde_json::from_slice(payload).map_err(|e| InvalidReading::Malformed(e.to_string()))?;
    canonicalize(raw, received_at)
}

/// Classify a payload as operator control or telemetry.
pub fn parse_inbound(
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<InboundMessage, InvalidReading> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| InvalidReading::Malformed(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| InvalidReading::Malformed("expected a JSON object".into()))?;

    if let Some(command) = object.get("command") {
        let name = command.as_str().unwrap_or_default();
        return match name {
            "reset" => Ok(InboundMessage::Control(ControlCommand::Reset)),
            other => Err(InvalidReading::UnknownCommand(other.to_string())),
        };
    }

    let raw: RawTelemetry =
        serde_json::from_value(value).map_err(|e| InvalidReading::Malformed(e.to_string()))?;
    canonicalize(raw, received_at).map(InboundMessage::Telemetry)
}
