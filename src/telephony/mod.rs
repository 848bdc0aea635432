//! Telephony media-stream adapter.
//!
//! Translates the gateway's ordered `start` / `media` / `stop` control frames
//! into relay calls, with a caller-chosen commit policy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::realtime::AudioRelay;
use crate::util::text::truncate_chars;

/// Stream id used by [`synthetic_call`].
pub const SYNTHETIC_STREAM_SID: &str = "sim-1";

/// One control frame from the telephony gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamEvent {
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    Media {
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    /// `connected`, `mark`, `dtmf` and anything newer.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64 audio, forwarded untouched.
    pub payload: String,
}

impl MediaStreamEvent {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|error| BridgeError::Parse(format!("Invalid media stream frame: {error}")))
    }

    pub fn media(payload: impl Into<String>) -> Self {
        Self::Media {
            media: MediaPayload {
                payload: payload.into(),
            },
        }
    }
}

/// When the pump closes an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Commit after every `n` forwarded frames, and on stop.
    EveryFrames(usize),
    /// Commit only on stop; server-side turn detection segments the rest.
    Manual,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self::EveryFrames(50)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub frames_forwarded: usize,
    pub frames_dropped: usize,
    pub commits: usize,
}

/// Feeds one media stream into an [`AudioRelay`].
pub struct MediaStreamPump {
    relay: AudioRelay,
    policy: CommitPolicy,
    stream_sid: Option<String>,
    pending: usize,
    stats: PumpStats,
}

impl MediaStreamPump {
    pub fn new(relay: AudioRelay, policy: CommitPolicy) -> Self {
        Self {
            relay,
            policy,
            stream_sid: None,
            pending: 0,
            stats: PumpStats::default(),
        }
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Parse one gateway text frame and dispatch it.
    pub fn handle_text(&mut self, text: &str) -> Result<()> {
        match MediaStreamEvent::parse(text) {
            Ok(event) => {
                self.handle(event);
                Ok(())
            }
            Err(error) => {
                warn!(
                    error = %error,
                    raw = %truncate_chars(text, 120),
                    "Dropping malformed media stream frame"
                );
                Err(error)
            }
        }
    }

    pub fn handle(&mut self, event: MediaStreamEvent) {
        match event {
            MediaStreamEvent::Start { stream_sid } => {
                info!(stream_sid = ?stream_sid, "Media stream started");
                self.stream_sid = stream_sid;
                self.pending = 0;
                self.stats = PumpStats::default();
            }
            MediaStreamEvent::Media { media } => self.forward(&media.payload),
            MediaStreamEvent::Stop { stream_sid } => {
                if self.pending > 0 {
                    self.commit();
                }
                info!(
                    stream_sid = ?stream_sid.or_else(|| self.stream_sid.clone()),
                    frames = self.stats.frames_forwarded,
                    commits = self.stats.commits,
                    "Media stream stopped"
                );
            }
            MediaStreamEvent::Other => debug!("Ignoring media stream control event"),
        }
    }

    fn forward(&mut self, payload: &str) {
        if !self.relay.append_audio(payload) {
            self.stats.frames_dropped += 1;
            return;
        }
        self.stats.frames_forwarded += 1;
        self.pending += 1;

        if let CommitPolicy::EveryFrames(every) = self.policy {
            if every > 0 && self.pending >= every {
                self.commit();
            }
        }
    }

    fn commit(&mut self) {
        if self.relay.commit() {
            self.stats.commits += 1;
            self.pending = 0;
        } else {
            debug!(pending = self.pending, "Media stream commit not delivered");
        }
    }
}

/// A simulated call: start, `frames` media frames, stop.
///
/// Frames are numbered from 1; frame `n` carries `frame_bytes` bytes all
/// equal to `n % 256`.
pub fn synthetic_call(frames: usize, frame_bytes: usize) -> Vec<MediaStreamEvent> {
    let mut events = Vec::with_capacity(frames + 2);
    events.push(MediaStreamEvent::Start {
        stream_sid: Some(SYNTHETIC_STREAM_SID.to_string()),
    });
    events.extend((1..=frames).map(|n| {
        let samples = vec![(n % 256) as u8; frame_bytes];
        MediaStreamEvent::media(STANDARD.encode(samples))
    }));
    events.push(MediaStreamEvent::Stop {
        stream_sid: Some(SYNTHETIC_STREAM_SID.to_string()),
    });
    events
}
