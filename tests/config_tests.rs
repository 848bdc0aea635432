//! Tests for environment-driven configuration.

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use voxbridge::config::{AudioFormat, BridgeConfig, TurnDetection};
use voxbridge::error::BridgeError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 7] = [
    "OPENAI_API_KEY",
    "OPENAI_REALTIME_URL",
    "OPENAI_REALTIME_MODEL",
    "OPENAI_REALTIME_VOICE",
    "OPENAI_REALTIME_INSTRUCTIONS",
    "OPENAI_REALTIME_AUDIO_FORMAT",
    "OPENAI_REALTIME_TURN_DETECTION",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_config_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn from_env_reads_realtime_overrides() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_config_env();

    std::env::set_var("OPENAI_API_KEY", "sk-from-env");
    std::env::set_var("OPENAI_REALTIME_URL", "ws://localhost:9999/v1/realtime");
    std::env::set_var("OPENAI_REALTIME_MODEL", "gpt-realtime");
    std::env::set_var("OPENAI_REALTIME_VOICE", "verse");
    std::env::set_var("OPENAI_REALTIME_AUDIO_FORMAT", "pcm16");
    std::env::set_var("OPENAI_REALTIME_TURN_DETECTION", "semantic_vad");

    let config = BridgeConfig::from_env().expect("config should load");

    assert_eq!(config.api_key.as_deref(), Some("sk-from-env"));
    assert_eq!(
        config.realtime_url().expect("url should build"),
        "ws://localhost:9999/v1/realtime?model=gpt-realtime"
    );
    assert_eq!(config.voice, "verse");
    assert_eq!(config.input_format, AudioFormat::Pcm);
    assert_eq!(config.output_format, AudioFormat::Pcm);
    assert_eq!(config.turn_detection, Some(TurnDetection::SemanticVad));
    assert_eq!(config.keepalive_interval, Duration::from_secs(20));
}

#[test]
fn turn_detection_can_be_disabled() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_config_env();

    std::env::set_var("OPENAI_REALTIME_TURN_DETECTION", "none");
    let config = BridgeConfig::from_env().expect("config should load");
    assert_eq!(config.turn_detection, None);
}

#[test]
fn invalid_audio_format_is_a_configuration_error() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_config_env();

    std::env::set_var("OPENAI_REALTIME_AUDIO_FORMAT", "mp3");
    let error = BridgeConfig::from_env().expect_err("mp3 should be rejected");
    assert!(matches!(error, BridgeError::Configuration(_)));
}

#[test]
fn blank_credential_is_missing() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_config_env();

    std::env::set_var("OPENAI_API_KEY", "   ");
    let config = BridgeConfig {
        api_key: None,
        ..BridgeConfig::default()
    };
    let error = config.resolve_api_key().expect_err("blank key should fail");
    assert!(matches!(error, BridgeError::MissingCredential(_)));
    assert!(error.is_setup_error());
}

#[test]
fn resolve_api_key_falls_back_to_environment() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_config_env();

    std::env::set_var("OPENAI_API_KEY", "sk-fallback");
    let config = BridgeConfig::default();
    assert_eq!(
        config.resolve_api_key().expect("key should resolve"),
        "sk-fallback"
    );
}

#[test]
fn env_file_values_fill_unset_variables() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_config_env();

    let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
    writeln!(file, "OPENAI_API_KEY=sk-dotenv").expect("env file should be written");
    writeln!(file, "OPENAI_REALTIME_VOICE=shimmer").expect("env file should be written");
    std::env::set_var("OPENAI_REALTIME_VOICE", "alloy");

    let config = BridgeConfig::from_env_file(file.path()).expect("env file should load");
    assert_eq!(config.api_key.as_deref(), Some("sk-dotenv"));
    assert_eq!(config.voice, "alloy");
}

#[test]
fn missing_env_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let error = BridgeConfig::from_env_file(dir.path().join("absent.env"))
        .expect_err("missing file should fail");
    assert!(matches!(error, BridgeError::Configuration(_)));
}
