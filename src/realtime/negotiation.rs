//! Post-open session negotiation.
//!
//! Once the socket is open a single `session.update` is sent after a short
//! delay. The task is owned by the connection and aborted on teardown, so a
//! closed session never negotiates.

use std::time::Duration;

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::{info, warn};

use super::messages::ClientEvent;
use super::session::Outbound;
use crate::config::{AudioFormat, BridgeConfig, TurnDetection};

/// The `session` object of a `session.update` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub model: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub output_modalities: Vec<String>,
    pub audio: SessionAudio,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionAudio {
    pub input: AudioInput,
    pub output: AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioInput {
    pub format: FormatDescriptor,
    pub turn_detection: Option<TurnDetection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioOutput {
    pub format: FormatDescriptor,
    pub voice: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormatDescriptor {
    #[serde(rename = "type")]
    pub format: AudioFormat,
}

impl SessionConfig {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            model: config.model.clone(),
            session_type: "realtime".to_string(),
            output_modalities: vec!["audio".to_string()],
            audio: SessionAudio {
                input: AudioInput {
                    format: FormatDescriptor {
                        format: config.input_format,
                    },
                    turn_detection: config.turn_detection,
                },
                output: AudioOutput {
                    format: FormatDescriptor {
                        format: config.output_format,
                    },
                    voice: config.voice.clone(),
                },
            },
            instructions: config.instructions.clone(),
        }
    }
}

/// Spawn the one-shot negotiation for a freshly opened connection.
///
/// Delivery failure is logged and not retried.
pub(crate) fn schedule(
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    session: SessionConfig,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        time::sleep(delay).await;

        let event = ClientEvent::SessionUpdate { session };
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(error = %error, "Realtime session.update serialization failed");
                return;
            }
        };
        match outbound_tx.send(Outbound::Text(payload)) {
            Ok(()) => info!("Realtime session.update sent"),
            Err(_) => warn!("Realtime session.update dropped: connection already gone"),
        }
    })
}
