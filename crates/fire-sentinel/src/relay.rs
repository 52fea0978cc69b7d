//! Best-effort dashboard relay.
//!
//! The HTTP adapter speaks the dashboard's REST API:
//!
//! | Event    | Endpoint           | Body                                             |
//! |----------|--------------------|--------------------------------------------------|
//! | reading  | `POST /sensores`   | `{temperatura, humedad, luminosidad, timestamp}` |
//! | state    | `POST /estado`     | `{estado, episodio, timestamp}`                  |
//! | evidence | `POST /imagen`     | `{nombre, data_url, timestamp}`                  |
//! |          | `POST /audio`      | `{nombre, data_url, timestamp}`                  |
//!
//! Failures are returned to the caller, which logs and drops them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use detection::{Assessment, EpisodeId, RelayEvent, RiskState, SensorReading};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dashboard returned HTTP {0}")]
    Status(u16),

    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Port: the live dashboard.
#[async_trait]
pub trait DashboardRelay: Send + Sync {
    async fn push_reading(&self, reading: &SensorReading) -> Result<(), RelayError>;

    async fn push_state(&self, state: RiskState, episode: EpisodeId) -> Result<(), RelayError>;

    async fn push_evidence(&self, episode: EpisodeId, assessment: &Assessment)
        -> Result<(), RelayError>;
}

/// Route a relay event to the matching port method.
pub async fn deliver(relay: &dyn DashboardRelay, event: &RelayEvent) -> Result<(), RelayError> {
    match event {
        RelayEvent::Reading { reading, .. } => relay.push_reading(reading).await,
        RelayEvent::State { state, episode, .. } => relay.push_state(*state, *episode).await,
        RelayEvent::Evidence {
            episode,
            assessment,
            ..
        } => relay.push_evidence(*episode, assessment).await,
    }
}

/// Used when no dashboard is configured.
pub struct NoopRelay;

#[async_trait]
impl DashboardRelay for NoopRelay {
    async fn push_reading(&self, _reading: &SensorReading) -> Result<(), RelayError> {
        Ok(())
    }

    async fn push_state(&self, _state: RiskState, _episode: EpisodeId) -> Result<(), RelayError> {
        Ok(())
    }

    async fn push_evidence(
        &self,
        _episode: EpisodeId,
        _assessment: &Assessment,
    ) -> Result<(), RelayError> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SensorPayload {
    temperatura: f64,
    humedad: f64,
    luminosidad: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct StatePayload<'a> {
    estado: &'a str,
    episodio: EpisodeId,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MediaPayload {
    nombre: String,
    data_url: String,
    timestamp: DateTime<Utc>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        _ => "audio/wav",
    }
}

/// Base64 `data:` URL for an artifact on disk.
pub async fn data_url(path: &Path) -> Result<String, RelayError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| RelayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes)))
}

/// Dashboard REST client.
pub struct HttpDashboardRelay {
    client: reqwest::Client,
    api_url: String,
}

impl HttpDashboardRelay {
    /// `client` should carry the relay timeout.
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<(), RelayError> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.api_url))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }
        tracing::debug!(endpoint, "Dashboard updated");
        Ok(())
    }

    async fn post_media(&self, endpoint: &str, path: &Path) -> Result<(), RelayError> {
        let payload = MediaPayload {
            nombre: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            data_url: data_url(path).await?,
            timestamp: Utc::now(),
        };
        self.post(endpoint, &payload).await
    }
}

#[async_trait]
impl DashboardRelay for HttpDashboardRelay {
    async fn push_reading(&self, reading: &SensorReading) -> Result<(), RelayError> {
        self.post(
            "sensores",
            &SensorPayload {
                temperatura: round_to(reading.temperature, 1),
                humedad: round_to(reading.humidity, 1),
                luminosidad: round_to(reading.light, 0),
                timestamp: reading.received_at,
            },
        )
        .await
    }

    async fn push_state(&self, state: RiskState, episode: EpisodeId) -> Result<(), RelayError> {
        self.post(
            "estado",
            &StatePayload {
                estado: state.dashboard_label(),
                episodio: episode,
                timestamp: Utc::now(),
            },
        )
        .await
    }

    async fn push_evidence(
        &self,
        _episode: EpisodeId,
        assessment: &Assessment,
    ) -> Result<(), RelayError> {
        if let Some(image) = &assessment.evidence.image_ref {
            self.post_media("imagen", image).await?;
        }
        if let Some(audio) = &assessment.evidence.audio_ref {
            self.post_media("audio", audio).await?;
        }
        Ok(())
    }
}
