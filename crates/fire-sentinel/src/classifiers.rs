//! Classifier ports: black-box scoring of captured artifacts.
//!
//! The image and audio models live outside this process. The default adapter
//! runs a scoring program with the artifact path as its last argument and reads
//! a confidence from the last non-empty line of stdout:
//!
//! ```text
//! $ python3 score_image.py foto_incendio.jpg
//! 0.82
//! ```
//!
//! `none` or `false` means "nothing detected" and scores 0.0.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use detection::{ClassifierScore, ScoreSource};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to run classifier: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Classifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Unparseable classifier output: `{0}`")]
    BadOutput(String),
}

/// Port: score one artifact, returning a confidence in `[0, 1]`.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn score(&self, artifact: &Path) -> Result<f64, ClassifierError>;
}

/// Always unavailable. Used when no scoring program is configured.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn score(&self, _artifact: &Path) -> Result<f64, ClassifierError> {
        Err(ClassifierError::Unavailable("not configured".into()))
    }
}

/// Runs an external scoring program.
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    /// `argv[0]` is the program; the artifact path is appended after `argv[1..]`.
    pub fn new(argv: &[String], timeout: Duration) -> Result<Self, ClassifierError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ClassifierError::Unavailable("empty command".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

/// Parse the last non-empty stdout line as a confidence.
pub fn parse_confidence(stdout: &str) -> Result<f64, ClassifierError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or_default();

    match line.to_ascii_lowercase().as_str() {
        "" | "none" | "false" => Ok(0.0),
        other => other
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ClassifierError::BadOutput(line.to_string())),
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn score(&self, artifact: &Path) -> Result<f64, ClassifierError> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(artifact)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout))?
            .map_err(ClassifierError::Spawn)?;

        if !output.status.success() {
            return Err(ClassifierError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_confidence(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Score an artifact, degrading to an unavailable 0.0 score on any failure.
pub async fn score_artifact(
    classifier: &dyn Classifier,
    source: ScoreSource,
    artifact: Option<&Path>,
) -> ClassifierScore {
    let Some(path) = artifact else {
        debug!(%source, "No artifact captured; scoring 0.0");
        return ClassifierScore::unavailable(source);
    };

    match classifier.score(path).await {
        Ok(confidence) => {
            let score = ClassifierScore::new(source, confidence);
            debug!(%source, confidence = score.confidence, "Classifier scored artifact");
            score
        }
        Err(e) => {
            warn!(%source, error = %e, "Classifier failed; scoring 0.0");
            ClassifierScore::unavailable(source)
        }
    }
}
