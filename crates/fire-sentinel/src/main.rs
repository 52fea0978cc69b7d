//! Fire Sentinel
//!
//! Subscribes to sensor telemetry, escalates sustained heat/light readings to a
//! risk episode, captures and scores evidence, and alerts once a fire is
//! confirmed.
//!
//! # Usage
//!
//! ```bash
//! # MQTT with defaults
//! fire-sentinel
//!
//! # Config file plus overrides
//! FIRE_BOT_TOKEN=... FIRE_CHAT_ID=... fire-sentinel --config sentinel.toml
//!
//! # Replay recorded telemetry
//! fire-sentinel --transport stdin < readings.ndjson
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fire_sentinel::{
    Detector, DetectorSettings, LineSource, MqttSource, Ports, SentinelConfig, TelemetrySource,
    TransportKind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Capacity of the transport → detector channel.
const INBOX_CAPACITY: usize = 256;

/// Command-line arguments. Flags override the config file and environment.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "FIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Telemetry transport
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Emit JSON logs
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Camera base URL (serves /shot.jpg and /audio.wav)
    #[arg(long)]
    camera_url: Option<String>,

    /// Dashboard API base URL
    #[arg(long)]
    dashboard_url: Option<String>,

    /// MQTT broker host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT telemetry topic
    #[arg(long)]
    mqtt_topic: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut SentinelConfig) {
        if let Some(kind) = self.transport {
            config.transport.kind = kind;
        }
        if let Some(url) = &self.camera_url {
            config.capture.camera_url = url.clone();
        }
        if let Some(url) = &self.dashboard_url {
            config.dashboard.api_url = Some(url.clone());
        }
        if let Some(host) = &self.mqtt_host {
            config.transport.mqtt.host = host.clone();
        }
        if let Some(topic) = &self.mqtt_topic {
            config.transport.mqtt.topic = topic.clone();
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let mut config =
        SentinelConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        transport = ?config.transport.kind,
        t_max = config.detection.t_max,
        l_max = config.detection.l_max,
        n_risk = config.detection.n_risk,
        n_recover = config.detection.n_recover,
        camera = %config.capture.camera_url,
        "Fire sentinel starting"
    );

    let ports = Ports::from_config(&config)?;
    let detector = Detector::new(
        config.detection.clone(),
        DetectorSettings::from_config(&config),
        ports,
    );

    let source: Box<dyn TelemetrySource> = match config.transport.kind {
        TransportKind::Mqtt => Box::new(MqttSource::new(
            config.transport.mqtt.clone(),
            config.transport.reconnect.clone(),
        )),
        TransportKind::Stdin => Box::new(LineSource::stdin()),
    };

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

    let transport = tokio::spawn(source.run(tx, cancel.clone()));
    let actor = tokio::spawn(detector.run(rx, cancel.clone()));

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                ctrl_c_cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let report = actor.await.context("Detector task panicked")?;
    cancel.cancel();
    match transport.await.context("Transport task panicked")? {
        Ok(()) => {}
        Err(e) => error!(error = %e, "Transport stopped with an error"),
    }

    info!(
        state = %report.state,
        episode = report.context.episode,
        readings = report.stats.readings,
        rejected = report.stats.rejected,
        captures = report.stats.captures,
        alerts = report.stats.alerts,
        history = %report.summary,
        "Fire sentinel stopped"
    );
    Ok(())
}
