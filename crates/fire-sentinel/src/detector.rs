//! Detector actor, the single owner of the [`RiskMachine`].
//!
//! Every input reaches the machine through this task: raw telemetry from the
//! transport, plus completions reported back by the tasks it spawns. Effects
//! returned by the machine are executed here:
//!
//! - `CaptureEvidence` spawns capture → classification → fusion, which reports
//!   back as `FusionCompleted`.
//! - `Notify` spawns dispatch with bounded retry, which reports back as
//!   `NotificationFinished`.
//! - `Relay` spawns a fire-and-forget dashboard push with its own timeout.
//!
//! Nothing slow runs on the actor itself, so ingestion never waits on I/O.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use detection::{
    parse_inbound, Assessment, ControlCommand, DetectionPolicy, Effect, EpisodeContext,
    EpisodeId, FusionWeights, InboundMessage, Input, RelayEvent, RetryPolicy, RiskMachine,
    RiskState, ScoreSource,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::{EvidenceSource, HttpEvidenceSource};
use crate::classifiers::{score_artifact, Classifier, CommandClassifier, DisabledClassifier};
use crate::config::SentinelConfig;
use crate::notifier::{notify_with_retry, Alert, LogNotifier, Notifier, TelegramNotifier};
use crate::relay::{self, DashboardRelay, HttpDashboardRelay, NoopRelay};
use crate::transport::RawPayload;

/// Capacity of the completion channel fed by spawned tasks.
const COMPLETION_CAPACITY: usize = 16;

/// The external collaborators the detector drives.
#[derive(Clone)]
pub struct Ports {
    pub evidence: Arc<dyn EvidenceSource>,
    pub image_classifier: Arc<dyn Classifier>,
    pub audio_classifier: Arc<dyn Classifier>,
    pub notifier: Arc<dyn Notifier>,
    pub relay: Arc<dyn DashboardRelay>,
}

impl Ports {
    /// Build the production adapters. Unconfigured classifiers, notifier and
    /// dashboard fall back to their disabled/log/no-op variants.
    pub fn from_config(config: &SentinelConfig) -> anyhow::Result<Self> {
        let capture_client = reqwest::Client::builder()
            .connect_timeout(config.capture.capture_timeout())
            .build()
            .context("Failed to build camera HTTP client")?;
        let evidence: Arc<dyn EvidenceSource> = Arc::new(HttpEvidenceSource::with_client(
            capture_client,
            &config.capture,
        ));

        let timeout = config.classifiers.timeout();
        let classifier =
            |argv: &Option<Vec<String>>, name: &str| -> anyhow::Result<Arc<dyn Classifier>> {
                match argv {
                    Some(argv) => Ok(Arc::new(
                        CommandClassifier::new(argv, timeout)
                            .with_context(|| format!("Invalid {name} classifier command"))?,
                    )),
                    None => {
                        warn!(classifier = name, "No classifier configured; it will score 0.0");
                        Ok(Arc::new(DisabledClassifier))
                    }
                }
            };
        let image_classifier = classifier(&config.classifiers.image_command, "image")?;
        let audio_classifier = classifier(&config.classifiers.audio_command, "audio")?;

        let notifier: Arc<dyn Notifier> = match config.notifier_credentials() {
            Some((token, chat_id)) => {
                let client = reqwest::Client::builder()
                    .timeout(config.notifier.timeout())
                    .build()
                    .context("Failed to build chat HTTP client")?;
                Arc::new(TelegramNotifier::new(
                    client,
                    &config.notifier.api_base,
                    token,
                    chat_id,
                ))
            }
            None => {
                warn!("No chat credentials configured; alerts go to the log only");
                Arc::new(LogNotifier)
            }
        };

        let relay: Arc<dyn DashboardRelay> = match &config.dashboard.api_url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(config.dashboard.timeout())
                    .build()
                    .context("Failed to build dashboard HTTP client")?;
                Arc::new(HttpDashboardRelay::new(client, url))
            }
            None => Arc::new(NoopRelay),
        };

        Ok(Self {
            evidence,
            image_classifier,
            audio_classifier,
            notifier,
            relay,
        })
    }
}

/// Runtime knobs that are not part of the transition rules.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub fusion: FusionWeights,
    pub notify_retry: RetryPolicy,
    pub caption: String,
    /// Upper bound on a single dashboard push.
    pub relay_timeout: Duration,
}

impl DetectorSettings {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            fusion: config.fusion,
            notify_retry: config.notifier.retry.clone(),
            caption: config.notifier.caption.clone(),
            relay_timeout: config.dashboard.timeout(),
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            notify_retry: RetryPolicy::default(),
            caption: "Fire alert".into(),
            relay_timeout: Duration::from_secs(5),
        }
    }
}

/// Reports from spawned tasks back to the actor.
#[derive(Debug)]
enum Completion {
    Fusion {
        episode: EpisodeId,
        assessment: Assessment,
    },
    Notification {
        episode: EpisodeId,
        delivered: bool,
    },
}

/// Counters kept by the actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub readings: u64,
    pub rejected: u64,
    pub resets: u64,
    pub captures: u64,
    pub alerts: u64,
}

/// Final snapshot returned when the actor stops.
#[derive(Debug, Clone)]
pub struct DetectorReport {
    pub state: RiskState,
    pub context: EpisodeContext,
    pub stats: DetectorStats,
    pub summary: String,
}

pub struct Detector {
    machine: RiskMachine,
    ports: Ports,
    settings: DetectorSettings,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    state_tx: watch::Sender<RiskState>,
    /// Spawned capture and notification tasks that have not reported back.
    in_flight: usize,
    stats: DetectorStats,
}

impl Detector {
    pub fn new(policy: DetectionPolicy, settings: DetectorSettings, ports: Ports) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_CAPACITY);
        let (state_tx, _) = watch::channel(RiskState::Normal);
        Self {
            machine: RiskMachine::new(policy),
            ports,
            settings,
            completions_tx,
            completions_rx,
            state_tx,
            in_flight: 0,
            stats: DetectorStats::default(),
        }
    }

    /// Observe state changes from outside the actor.
    pub fn subscribe_state(&self) -> watch::Receiver<RiskState> {
        self.state_tx.subscribe()
    }

    pub fn machine(&self) -> &RiskMachine {
        &self.machine
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    /// Drain `payloads` until cancelled, or until the transport closes and
    /// every spawned capture/notification task has reported back.
    pub async fn run(
        mut self,
        mut payloads: mpsc::Receiver<RawPayload>,
        cancel: CancellationToken,
    ) -> DetectorReport {
        let mut transport_open = true;

        loop {
            if !transport_open && self.in_flight == 0 {
                debug!("Transport closed and no work in flight");
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if self.in_flight > 0 {
                        warn!(in_flight = self.in_flight, "Shutting down with work in flight");
                    }
                    break;
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    self.handle_completion(completion);
                }
                payload = payloads.recv(), if transport_open => match payload {
                    Some(raw) => self.handle_payload(raw),
                    None => {
                        info!(in_flight = self.in_flight, "Transport closed");
                        transport_open = false;
                    }
                },
            }
        }

        self.report()
    }

    pub fn report(&self) -> DetectorReport {
        DetectorReport {
            state: self.machine.state(),
            context: self.machine.context().clone(),
            stats: self.stats.clone(),
            summary: self.machine.summary(),
        }
    }

    /// Parse one inbound message and feed it to the machine.
    pub fn handle_payload(&mut self, raw: RawPayload) {
        match parse_inbound(&raw.payload, raw.received_at) {
            Ok(InboundMessage::Telemetry(reading)) => {
                self.stats.readings += 1;
                debug!(
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    light = reading.light,
                    "Reading"
                );
                self.apply(Input::Reading(reading));
                let ctx = self.machine.context();
                debug!(
                    state = %self.machine.state(),
                    risk_streak = ctx.risk_streak,
                    normal_streak = ctx.normal_streak,
                    "Streaks"
                );
            }
            Ok(InboundMessage::Control(ControlCommand::Reset)) => {
                self.stats.resets += 1;
                info!(state = %self.machine.state(), "Operator reset received");
                self.apply(Input::Reset);
            }
            Err(e) => {
                self.stats.rejected += 1;
                warn!(origin = %raw.origin, error = %e, "Dropping invalid telemetry");
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fusion {
                episode,
                assessment,
            } => self.apply(Input::FusionCompleted {
                episode,
                assessment,
            }),
            Completion::Notification { episode, delivered } => {
                self.apply(Input::NotificationFinished { episode, delivered });
            }
        }
    }

    fn apply(&mut self, input: Input) {
        match self.machine.apply(&input) {
            Ok(effects) => {
                self.state_tx.send_replace(self.machine.state());
                for effect in effects {
                    self.execute(effect);
                }
            }
            Err(e) => error!(error = %e, "State machine rejected input"),
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::CaptureEvidence {
                episode,
                low_humidity,
            } => {
                if low_humidity {
                    warn!(episode, "Low humidity; conditions favour fire spread");
                }
                self.spawn_capture(episode);
            }
            Effect::Notify {
                episode,
                assessment,
            } => self.spawn_notify(episode, assessment),
            Effect::Relay(event) => self.spawn_relay(event),
        }
    }

    fn spawn_capture(&mut self, episode: EpisodeId) {
        self.in_flight += 1;
        self.stats.captures += 1;
        info!(episode, "Capturing evidence");

        let evidence = Arc::clone(&self.ports.evidence);
        let image_classifier = Arc::clone(&self.ports.image_classifier);
        let audio_classifier = Arc::clone(&self.ports.audio_classifier);
        let weights = self.settings.fusion;
        let tx = self.completions_tx.clone();

        tokio::spawn(async move {
            let report = evidence.capture().await;
            let evidence = report.evidence();
            let (image, audio) = tokio::join!(
                score_artifact(
                    image_classifier.as_ref(),
                    ScoreSource::Image,
                    evidence.image_ref.as_deref()
                ),
                score_artifact(
                    audio_classifier.as_ref(),
                    ScoreSource::Audio,
                    evidence.audio_ref.as_deref()
                ),
            );
            let assessment = Assessment::new(evidence, image, audio, &weights);
            info!(
                episode,
                image = assessment.image.confidence,
                audio = assessment.audio.confidence,
                score = assessment.fusion.score,
                decided = assessment.fusion.decided,
                "Evidence fused"
            );
            if tx
                .send(Completion::Fusion {
                    episode,
                    assessment,
                })
                .await
                .is_err()
            {
                debug!(episode, "Detector stopped before fusion result arrived");
            }
        });
    }

    fn spawn_notify(&mut self, episode: EpisodeId, assessment: Option<Assessment>) {
        self.in_flight += 1;
        self.stats.alerts += 1;

        let alert = Alert::new(episode, assessment.as_ref(), &self.settings.caption);
        info!(episode, dedup_key = %alert.dedup_key, "Dispatching fire alert");

        let notifier = Arc::clone(&self.ports.notifier);
        let retry = self.settings.notify_retry.clone();
        let tx = self.completions_tx.clone();

        tokio::spawn(async move {
            let delivered = match notify_with_retry(notifier.as_ref(), &alert, &retry).await {
                Ok(()) => true,
                Err(e) => {
                    error!(episode, dedup_key = %alert.dedup_key, error = %e, "Alert delivery failed");
                    false
                }
            };
            if tx
                .send(Completion::Notification { episode, delivered })
                .await
                .is_err()
            {
                debug!(episode, "Detector stopped before notification result arrived");
            }
        });
    }

    fn spawn_relay(&self, event: RelayEvent) {
        let relay = Arc::clone(&self.ports.relay);
        let timeout = self.settings.relay_timeout;

        tokio::spawn(async move {
            let kind = event.event_type();
            match tokio::time::timeout(timeout, relay::deliver(relay.as_ref(), &event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event = kind, error = %e, "Dashboard relay failed"),
                Err(_) => warn!(
                    event = kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "Dashboard relay timed out"
                ),
            }
        });
    }
}
