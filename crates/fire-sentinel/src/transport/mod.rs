//! Telemetry transports.
//!
//! A transport only moves bytes: it forwards inbound payloads to the detector
//! as [`RawPayload`]s and leaves parsing to the detector, so a malformed
//! message is rejected in one place regardless of where it came from. The
//! broker source drops messages while the detector inbox is full; the line
//! source waits.

mod lines;
mod mqtt;

pub use lines::LineSource;
pub use mqtt::MqttSource;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One inbound message, unparsed.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
    /// Topic or stream name, for logs.
    pub origin: String,
}

impl RawPayload {
    pub fn new(payload: impl Into<Bytes>, origin: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            received_at: Utc::now(),
            origin: origin.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Broker client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Port: a source of raw telemetry.
///
/// `run` returns when the source is exhausted, when `cancel` fires, or when
/// the detector has gone away (the channel is closed).
#[async_trait]
pub trait TelemetrySource: Send {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;
}
