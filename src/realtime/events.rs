//! Inbound realtime events and their classification.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::util::text::truncate_chars;

const SUMMARY_CHARS: usize = 120;

/// A server frame, classified once at the parse boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    SessionCreated { session_id: Option<String> },
    SessionUpdated { session_id: Option<String> },
    /// Base64 output audio. Only its length is ever logged.
    AudioDelta { delta: String },
    TextDelta { text: String },
    Error { message: String },
    /// Anything this bridge does not act on, kept verbatim.
    Unknown {
        event_type: Option<String>,
        raw: Value,
    },
}

/// What a session broadcasts to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Inbound(InboundMessage),
    Closed { code: Option<u16>, reason: String },
}

impl InboundMessage {
    /// Parse one text frame. Fails only when the frame is not JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let value = serde_json::from_str::<Value>(text)
            .map_err(|error| BridgeError::Parse(format!("Inbound frame is not JSON: {error}")))?;
        Ok(Self::from_value(value))
    }

    /// Classify an already-decoded payload.
    ///
    /// Known discriminants win over an attached `error` field.
    pub fn from_value(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("session.created") => Self::SessionCreated {
                session_id: session_id(&value),
            },
            Some("session.updated") => Self::SessionUpdated {
                session_id: session_id(&value),
            },
            Some("response.output_audio.delta") | Some("response.audio.delta") => {
                Self::AudioDelta {
                    delta: string_field(&value, "delta").unwrap_or_default(),
                }
            }
            Some("response.output_text.delta") | Some("response.text.delta") => Self::TextDelta {
                text: string_field(&value, "delta")
                    .or_else(|| string_field(&value, "text"))
                    .unwrap_or_default(),
            },
            _ if is_error_shaped(&value) => Self::Error {
                message: error_message(&value),
            },
            event_type => Self::Unknown {
                event_type: event_type.map(ToString::to_string),
                raw: value,
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Emit the log line for this message at its level.
    pub fn log(&self) {
        match self {
            Self::SessionCreated { session_id } => {
                info!(session_id = ?session_id, "Realtime session created");
            }
            Self::SessionUpdated { session_id } => {
                info!(session_id = ?session_id, "Realtime session updated");
            }
            Self::AudioDelta { delta } => {
                debug!(bytes = delta.len(), "Realtime audio delta received");
            }
            Self::TextDelta { text } => {
                info!(text = %text, "Realtime text delta");
            }
            Self::Error { message } => {
                warn!(message = %message, "Realtime server reported an error");
            }
            Self::Unknown { event_type, raw } => match event_type {
                Some(event_type) => debug!(event_type = %event_type, "Realtime event"),
                None => {
                    let rendered = raw.to_string();
                    debug!(
                        payload = %truncate_chars(&rendered, SUMMARY_CHARS),
                        "Realtime event without type"
                    );
                }
            },
        }
    }
}

/// Parse, log, and return a frame. Malformed frames are logged and dropped.
pub fn classify(text: &str) -> Option<InboundMessage> {
    match InboundMessage::parse(text) {
        Ok(message) => {
            message.log();
            Some(message)
        }
        Err(error) => {
            warn!(
                error = %error,
                raw = %truncate_chars(text, SUMMARY_CHARS),
                "Dropping malformed realtime frame"
            );
            None
        }
    }
}

fn is_error_shaped(value: &Value) -> bool {
    matches!(
        value.get("type").and_then(Value::as_str),
        Some("error") | Some("response.error")
    ) || value.get("error").is_some_and(is_truthy)
}

/// `false`, `0`, `""` and `null` do not flag a payload as an error.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn error_message(value: &Value) -> String {
    string_field(value, "message")
        .or_else(|| string_at(value, &["error", "message"]))
        .or_else(|| string_field(value, "error"))
        .unwrap_or_else(|| value.to_string())
}

fn session_id(value: &Value) -> Option<String> {
    string_at(value, &["session", "id"]).or_else(|| string_field(value, "session_id"))
}

// Empty strings count as absent so fallback chains keep looking.
fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current
        .as_str()
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}
