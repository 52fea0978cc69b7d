//! Notification port and the chat-bot adapter.
//!
//! The detector dispatches at most one alert per confirmed episode. Dispatch
//! goes through [`notify_with_retry`], which retries transient failures with
//! exponential backoff and gives up on permanent ones. Every alert carries a
//! dedup key so a receiver can drop duplicates caused by retries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use detection::{Assessment, EpisodeId, RetryPolicy};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to read alert image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NotifyError {
    /// Connection errors, timeouts, 429 and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Io { .. } => false,
        }
    }
}

/// One alert for one confirmed episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub episode: EpisodeId,
    pub dedup_key: Uuid,
    pub caption: String,
    pub image: Option<PathBuf>,
    pub score: Option<f64>,
}

impl Alert {
    pub fn new(episode: EpisodeId, assessment: Option<&Assessment>, caption: &str) -> Self {
        let score = assessment.map(|a| a.fusion.score);
        let caption = match score {
            Some(score) => format!("{caption} (score {:.0}%)", score * 100.0),
            None => caption.to_string(),
        };
        Self {
            episode,
            dedup_key: Uuid::new_v4(),
            caption,
            image: assessment.and_then(|a| a.evidence.image_ref.clone()),
            score,
        }
    }

    /// Caption as sent to the chat, tagged with the dedup key.
    pub fn outgoing_text(&self) -> String {
        format!("{} [id {}]", self.caption, self.dedup_key)
    }
}

/// Port: deliver an alert to an external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts to the log. Used when no chat channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        warn!(
            episode = alert.episode,
            dedup_key = %alert.dedup_key,
            caption = %alert.caption,
            "FIRE ALERT (no chat channel configured)"
        );
        Ok(())
    }
}

/// Bot-API chat notifier: `sendPhoto` with the evidence image, or
/// `sendMessage` when no image was captured.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, api_base: &str, token: &str, chat_id: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn send_photo(
        &self,
        alert: &Alert,
        path: &Path,
    ) -> Result<reqwest::Response, NotifyError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| NotifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "evidence.jpg".into());

        let photo = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", alert.outgoing_text())
            .part("photo", photo);

        Ok(self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await?)
    }

    async fn send_message(&self, alert: &Alert) -> Result<reqwest::Response, NotifyError> {
        Ok(self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": alert.outgoing_text(),
            }))
            .send()
            .await?)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        let response = match &alert.image {
            Some(path) => self.send_photo(alert, path).await?,
            None => self.send_message(alert).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Dispatch with bounded retry on transient failures.
pub async fn notify_with_retry(
    notifier: &dyn Notifier,
    alert: &Alert,
    policy: &RetryPolicy,
) -> Result<(), NotifyError> {
    let mut attempt = 0;
    loop {
        match notifier.notify(alert).await {
            Ok(()) => {
                info!(
                    episode = alert.episode,
                    dedup_key = %alert.dedup_key,
                    attempts = attempt + 1,
                    "Alert delivered"
                );
                return Ok(());
            }
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                attempt += 1;
                let backoff = policy.backoff_duration(attempt);
                warn!(
                    episode = alert.episode,
                    attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient notification error, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
