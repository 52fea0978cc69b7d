//! Evidence acquisition: still image and audio clip from the field camera.
//!
//! Both legs run concurrently and fail independently: a failed leg leaves its
//! slot empty and the detector scores it 0.0. Artifacts overwrite the previous
//! episode's files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use detection::Evidence;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::CaptureConfig;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Camera returned HTTP {0}")]
    Status(u16),

    #[error("Camera returned an empty body")]
    Empty,

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one capture round, per leg.
#[derive(Debug)]
pub struct CaptureReport {
    pub image: Result<PathBuf, CaptureError>,
    pub audio: Result<PathBuf, CaptureError>,
    pub captured_at: DateTime<Utc>,
}

impl CaptureReport {
    /// Drop the errors, keep the artifact references.
    pub fn evidence(&self) -> Evidence {
        Evidence::new(
            self.image.as_ref().ok().cloned(),
            self.audio.as_ref().ok().cloned(),
            self.captured_at,
        )
    }
}

/// Port: something that can capture an image and an audio clip.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn capture(&self) -> CaptureReport;
}

/// Camera exposing `GET /shot.jpg` and a streamed `GET /audio.wav`.
pub struct HttpEvidenceSource {
    client: reqwest::Client,
    base_url: String,
    capture_timeout: Duration,
    audio_duration: Duration,
    image_path: PathBuf,
    audio_path: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CaptureError + '_ {
    move |source| CaptureError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn ensure_parent(path: &Path) -> Result<(), CaptureError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(path)),
        _ => Ok(()),
    }
}

impl HttpEvidenceSource {
    pub fn new(config: &CaptureConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &CaptureConfig) -> Self {
        Self {
            client,
            base_url: config.camera_url.trim_end_matches('/').to_string(),
            capture_timeout: config.capture_timeout(),
            audio_duration: config.audio_duration(),
            image_path: config.image_path.clone(),
            audio_path: config.audio_path.clone(),
        }
    }

    async fn request(&self, resource: &str) -> Result<reqwest::Response, CaptureError> {
        let url = format!("{}/{resource}", self.base_url);
        let response = tokio::time::timeout(self.capture_timeout, self.client.get(&url).send())
            .await
            .map_err(|_| CaptureError::Timeout(self.capture_timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::Status(status.as_u16()));
        }
        Ok(response)
    }

    /// Fetch a still image, bounded by the capture timeout end to end.
    pub async fn take_photo(&self) -> Result<PathBuf, CaptureError> {
        let fetch = async {
            let response = self.request("shot.jpg").await?;
            let body = response.bytes().await?;
            if body.is_empty() {
                return Err(CaptureError::Empty);
            }
            ensure_parent(&self.image_path).await?;
            tokio::fs::write(&self.image_path, &body)
                .await
                .map_err(io_error(&self.image_path))?;
            Ok(self.image_path.clone())
        };

        tokio::time::timeout(self.capture_timeout, fetch)
            .await
            .map_err(|_| CaptureError::Timeout(self.capture_timeout))?
    }

    /// Record the audio stream until `audio_duration` of wall time has passed
    /// or the stream ends. Stalls past the deadline keep what was recorded.
    pub async fn record_audio(&self) -> Result<PathBuf, CaptureError> {
        let mut response = self.request("audio.wav").await?;

        ensure_parent(&self.audio_path).await?;
        let mut file = tokio::fs::File::create(&self.audio_path)
            .await
            .map_err(io_error(&self.audio_path))?;

        let deadline = Instant::now() + self.audio_duration;
        let mut written = 0usize;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, response.chunk()).await {
                Err(_) => break,
                Ok(Ok(None)) => break,
                Ok(Ok(Some(chunk))) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(io_error(&self.audio_path))?;
                    written += chunk.len();
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        file.flush().await.map_err(io_error(&self.audio_path))?;

        if written == 0 {
            return Err(CaptureError::Empty);
        }
        Ok(self.audio_path.clone())
    }
}

#[async_trait]
impl EvidenceSource for HttpEvidenceSource {
    async fn capture(&self) -> CaptureReport {
        let (image, audio) = tokio::join!(self.take_photo(), self.record_audio());

        match &image {
            Ok(path) => info!(path = %path.display(), "Photo captured"),
            Err(e) => warn!(error = %e, "Photo capture failed"),
        }
        match &audio {
            Ok(path) => info!(path = %path.display(), "Audio recorded"),
            Err(e) => warn!(error = %e, "Audio recording failed"),
        }

        CaptureReport {
            image,
            audio,
            captured_at: Utc::now(),
        }
    }
}
