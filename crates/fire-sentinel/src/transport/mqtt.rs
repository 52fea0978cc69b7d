use std::time::Duration;

use async_trait::async_trait;
use detection::RetryPolicy;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{RawPayload, TelemetrySource, TransportError};
use crate::config::MqttConfig;

/// Highest attempt index fed to the backoff; past it the delay is capped anyway.
const MAX_BACKOFF_ATTEMPT: u32 = 16;

/// Broker keep-alive floor accepted by the client.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// MQTT subscription at QoS 1.
///
/// The event loop reconnects on its own when polled again after an error; this
/// source adds the backoff between polls and re-subscribes on every `ConnAck`,
/// since a persistent session is not guaranteed to survive a broker restart.
pub struct MqttSource {
    config: MqttConfig,
    reconnect: RetryPolicy,
}

impl MqttSource {
    pub fn new(config: MqttConfig, reconnect: RetryPolicy) -> Self {
        Self { config, reconnect }
    }

    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(
            self.config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS),
        ));
        options.set_clean_session(self.config.clean_session);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        options
    }
}

/// Hand a message to the detector without blocking the event loop.
///
/// A full inbox drops the message so keep-alive keeps flowing. Returns `false`
/// once the detector side is gone.
fn forward(tx: &mpsc::Sender<RawPayload>, payload: RawPayload) -> bool {
    match tx.try_send(payload) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            warn!(
                origin = %dropped.origin,
                bytes = dropped.payload.len(),
                "Detector inbox full; dropping message"
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[async_trait]
impl TelemetrySource for MqttSource {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawPayload>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 64);
        let topic = self.config.topic.clone();
        let mut failures: u32 = 0;

        info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %topic,
            client_id = %self.config.client_id,
            "Connecting to broker"
        );

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = client.try_disconnect() {
                        debug!(error = %e, "Disconnect request failed");
                    }
                    return Ok(());
                }
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if failures > 0 {
                        info!(attempts = failures, "Reconnected to broker");
                    }
                    failures = 0;
                    client.try_subscribe(topic.clone(), QoS::AtLeastOnce)?;
                    info!(topic = %topic, "Subscribed");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = RawPayload::new(publish.payload, publish.topic);
                    if !forward(&tx, payload) {
                        debug!("Detector inbox closed; stopping broker source");
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let backoff = self
                        .reconnect
                        .backoff_duration(failures.min(MAX_BACKOFF_ATTEMPT));
                    warn!(
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Broker connection lost; reconnecting"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }
}
