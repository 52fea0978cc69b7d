//! Runtime configuration.
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults (the field deployment values)
//! 2. Optional TOML file (`--config` / `FIRE_CONFIG`)
//! 3. `FIRE_*` environment variables
//! 4. CLI flags (applied by `main`)
//!
//! ```toml
//! [detection]
//! t_max = 45.0
//! n_risk = 5
//!
//! [fusion]
//! weight_image = 0.7
//! weight_audio = 0.3
//!
//! [capture]
//! camera_url = "http://10.0.0.12:8080"
//!
//! [transport]
//! kind = "mqtt"
//! [transport.mqtt]
//! host = "test.mosquitto.org"
//! topic = "incendio/sensores"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use detection::{DetectionPolicy, FusionWeights, PolicyError, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: `{value}`")]
    InvalidEnv { var: String, value: String },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Evidence capture endpoint and artifact locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Base URL serving `/shot.jpg` and `/audio.wav`.
    pub camera_url: String,
    pub capture_timeout_ms: u64,
    /// Audio is truncated once this much wall time has been recorded.
    pub audio_duration_ms: u64,
    pub image_path: PathBuf,
    pub audio_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_url: "http://127.0.0.1:8080".into(),
            capture_timeout_ms: 5_000,
            audio_duration_ms: 5_000,
            image_path: PathBuf::from("foto_incendio.jpg"),
            audio_path: PathBuf::from("audio_incendio.wav"),
        }
    }
}

impl CaptureConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn audio_duration(&self) -> Duration {
        Duration::from_millis(self.audio_duration_ms)
    }
}

/// External scoring programs. `None` disables the classifier (scores 0.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// e.g. `["python3", "DeteccionImagen/score.py"]`; the image path is appended.
    pub image_command: Option<Vec<String>>,
    pub audio_command: Option<Vec<String>>,
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            image_command: None,
            audio_command: None,
            timeout_ms: 30_000,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Chat-bot notifier. Disabled unless both token and chat id are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    pub caption: String,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".into(),
            caption: "¡Alerta! Incendio detectado 🔥".into(),
            timeout_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Dashboard REST API. Disabled when `api_url` is unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// e.g. `http://localhost:5001/api`
    pub api_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            timeout_ms: 5_000,
        }
    }
}

impl DashboardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Mqtt,
    /// Newline-delimited JSON on stdin.
    Stdin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".into(),
            port: 1883,
            client_id: "main-fire-detector".into(),
            topic: "incendio/sensores".into(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            clean_session: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub mqtt: MqttConfig,
    /// Backoff between broker reconnect attempts. `max_retries` is ignored.
    pub reconnect: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            mqtt: MqttConfig::default(),
            reconnect: RetryPolicy::reconnect(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub detection: DetectionPolicy,
    pub fusion: FusionWeights,
    pub capture: CaptureConfig,
    pub classifiers: ClassifierConfig,
    pub notifier: NotifierConfig,
    pub dashboard: DashboardConfig,
    pub transport: TransportConfig,
}

fn parse_var<T: FromStr>(var: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            value,
        })
}

impl SentinelConfig {
    /// Defaults, then the optional TOML file, then `FIRE_*` environment
    /// variables. Validated before returning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `FIRE_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        macro_rules! override_parsed {
            ($var:literal, $field:expr) => {
                if let Some(value) = lookup($var) {
                    $field = parse_var($var, value)?;
                }
            };
        }
        macro_rules! override_string {
            ($var:literal, $field:expr) => {
                if let Some(value) = lookup($var) {
                    $field = value;
                }
            };
        }
        macro_rules! override_optional {
            ($var:literal, $field:expr) => {
                if let Some(value) = lookup($var) {
                    $field = Some(value);
                }
            };
        }

        override_parsed!("FIRE_T_MAX", self.detection.t_max);
        override_parsed!("FIRE_L_MAX", self.detection.l_max);
        override_parsed!("FIRE_H_MIN", self.detection.h_min);
        override_parsed!("FIRE_N_RISK", self.detection.n_risk);
        override_parsed!("FIRE_N_RECOVER", self.detection.n_recover);

        override_parsed!("FIRE_WEIGHT_IMAGE", self.fusion.weight_image);
        override_parsed!("FIRE_WEIGHT_AUDIO", self.fusion.weight_audio);
        override_parsed!("FIRE_ALERT_THRESHOLD", self.fusion.alert_threshold);

        override_string!("FIRE_CAMERA_URL", self.capture.camera_url);
        override_parsed!("FIRE_CAPTURE_TIMEOUT_MS", self.capture.capture_timeout_ms);
        override_parsed!("FIRE_AUDIO_DURATION_MS", self.capture.audio_duration_ms);

        override_optional!("FIRE_DASHBOARD_URL", self.dashboard.api_url);
        override_optional!("FIRE_BOT_TOKEN", self.notifier.bot_token);
        override_optional!("FIRE_CHAT_ID", self.notifier.chat_id);

        override_string!("FIRE_MQTT_HOST", self.transport.mqtt.host);
        override_parsed!("FIRE_MQTT_PORT", self.transport.mqtt.port);
        override_string!("FIRE_MQTT_TOPIC", self.transport.mqtt.topic);
        override_string!("FIRE_MQTT_CLIENT_ID", self.transport.mqtt.client_id);
        override_optional!("FIRE_MQTT_USERNAME", self.transport.mqtt.username);
        override_optional!("FIRE_MQTT_PASSWORD", self.transport.mqtt.password);

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.fusion.validate()?;

        if self.capture.capture_timeout_ms == 0 {
            return Err(ConfigError::Invalid("capture_timeout_ms must be > 0".into()));
        }
        if self.capture.audio_duration_ms == 0 {
            return Err(ConfigError::Invalid("audio_duration_ms must be > 0".into()));
        }
        if self.classifiers.timeout_ms == 0 {
            return Err(ConfigError::Invalid("classifier timeout_ms must be > 0".into()));
        }
        for (name, command) in [
            ("image_command", &self.classifiers.image_command),
            ("audio_command", &self.classifiers.audio_command),
        ] {
            if matches!(command, Some(argv) if argv.is_empty()) {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Notifier credentials, when both are configured.
    pub fn notifier_credentials(&self) -> Option<(&str, &str)> {
        match (&self.notifier.bot_token, &self.notifier.chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }
}
