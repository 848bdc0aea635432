//! Bridge configuration (code > env > `.env` file).

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_USER_AGENT: &str = "chatystream-realtime/1.0";
pub const DEFAULT_VOICE: &str = "alloy";
pub const DEFAULT_INSTRUCTIONS: &str = "Je bent een vriendelijke Nederlandse kapperassistent. \
Beantwoord korte vragen, help met afspraken, en praat duidelijk in het Nederlands.";

const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Audio encodings understood by the realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// G.711 mu-law, 8 kHz. What telephony media streams carry.
    #[serde(rename = "audio/pcmu")]
    Pcmu,
    /// G.711 A-law, 8 kHz.
    #[serde(rename = "audio/pcma")]
    Pcma,
    /// 16-bit little-endian PCM, 24 kHz.
    #[serde(rename = "audio/pcm")]
    Pcm,
}

impl AudioFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pcmu => "audio/pcmu",
            Self::Pcma => "audio/pcma",
            Self::Pcm => "audio/pcm",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

impl FromStr for AudioFormat {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "audio/pcmu" | "pcmu" | "g711_ulaw" => Ok(Self::Pcmu),
            "audio/pcma" | "pcma" | "g711_alaw" => Ok(Self::Pcma),
            "audio/pcm" | "pcm" | "pcm16" => Ok(Self::Pcm),
            other => Err(BridgeError::Configuration(format!(
                "Unsupported audio format: {other}"
            ))),
        }
    }
}

/// Server-side utterance boundary detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad,
    SemanticVad,
}

impl FromStr for TurnDetection {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "server_vad" => Ok(Self::ServerVad),
            "semantic_vad" => Ok(Self::SemanticVad),
            other => Err(BridgeError::Configuration(format!(
                "Unsupported turn detection: {other}"
            ))),
        }
    }
}

/// Configuration for one realtime bridge session.
///
/// Credential resolution order:
/// 1. `api_key` set in code
/// 2. `OPENAI_API_KEY` from the process environment (or `.env` when loaded
///    through [`BridgeConfig::from_env`])
#[derive(Clone)]
pub struct BridgeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub user_agent: String,
    pub voice: String,
    pub input_format: AudioFormat,
    pub output_format: AudioFormat,
    /// `None` disables server-side turn detection; commits then drive turns.
    pub turn_detection: Option<TurnDetection>,
    pub instructions: String,
    /// Delay between the socket opening and the `session.update` send.
    pub negotiation_delay: Duration,
    pub keepalive_interval: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on how long `close()` waits for the graceful close handshake.
    pub close_timeout: Duration,
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("user_agent", &self.user_agent)
            .field("voice", &self.voice)
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("turn_detection", &self.turn_detection)
            .field("instructions", &self.instructions)
            .field("negotiation_delay", &self.negotiation_delay)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_REALTIME_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            input_format: AudioFormat::Pcmu,
            output_format: AudioFormat::Pcmu,
            turn_detection: Some(TurnDetection::ServerVad),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            negotiation_delay: Duration::from_millis(250),
            keepalive_interval: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl BridgeConfig {
    /// Load from environment variables, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_process_env()
    }

    /// Load a specific dotenv file into the environment, then read it.
    ///
    /// Variables already present in the process environment win.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        dotenvy::from_path(path).map_err(|error| {
            BridgeError::Configuration(format!(
                "Failed to load env file {}: {error}",
                path.display()
            ))
        })?;
        Self::from_process_env()
    }

    fn from_process_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(key) = non_empty_var(API_KEY_VAR) {
            config.api_key = Some(key);
        }
        if let Some(url) = non_empty_var("OPENAI_REALTIME_URL") {
            config.base_url = url;
        }
        if let Some(model) = non_empty_var("OPENAI_REALTIME_MODEL") {
            config.model = model;
        }
        if let Some(voice) = non_empty_var("OPENAI_REALTIME_VOICE") {
            config.voice = voice;
        }
        if let Some(instructions) = non_empty_var("OPENAI_REALTIME_INSTRUCTIONS") {
            config.instructions = instructions;
        }
        if let Some(format) = non_empty_var("OPENAI_REALTIME_AUDIO_FORMAT") {
            let format = format.parse::<AudioFormat>()?;
            config.input_format = format;
            config.output_format = format;
        }
        if let Some(turn_detection) = non_empty_var("OPENAI_REALTIME_TURN_DETECTION") {
            config.turn_detection = match turn_detection.as_str() {
                "none" | "off" => None,
                other => Some(other.parse()?),
            };
        }

        Ok(config)
    }

    /// Resolve the bearer credential: explicit key first, then `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .or_else(|| env::var(API_KEY_VAR).ok())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| BridgeError::MissingCredential(format!("{API_KEY_VAR} is not set")))
    }

    /// Reject settings a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_interval.is_zero() {
            return Err(BridgeError::Configuration(
                "Keepalive interval must be greater than zero".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.close_timeout.is_zero() {
            return Err(BridgeError::Configuration(
                "Connect and close timeouts must be greater than zero".into(),
            ));
        }
        self.realtime_url().map(|_| ())
    }

    /// Full socket URL with the model query parameter appended.
    pub fn realtime_url(&self) -> Result<String> {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::Configuration(
                "Realtime base URL cannot be empty".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(BridgeError::Configuration(
                "Realtime model cannot be empty".into(),
            ));
        }
        let separator = if trimmed.contains('?') { "&" } else { "?" };
        Ok(format!("{trimmed}{separator}model={}", self.model.trim()))
    }

    /// The configured key with all but its last four characters masked.
    pub fn redacted_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(redact)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn redact(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let visible: String = key.chars().skip(count - 4).collect();
    format!("****{visible}")
}
