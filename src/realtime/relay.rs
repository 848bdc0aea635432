//! Caller audio forwarding.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use super::{messages::ClientEvent, session::SessionShared};

/// Forwards append/commit commands into a session's open connection.
///
/// Cheap to clone; every clone targets the same session. Frames go out in
/// call order with no batching, and nothing is buffered while the session is
/// not open.
#[derive(Clone)]
pub struct AudioRelay {
    shared: Arc<SessionShared>,
}

impl AudioRelay {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Forward one base64 chunk. Returns `false` when nothing was sent.
    pub fn append_audio(&self, frame: &str) -> bool {
        if frame.is_empty() {
            debug!("Skipping empty audio frame");
            return false;
        }
        if !self.shared.is_open() {
            return false;
        }
        self.shared.send(&ClientEvent::InputAudioBufferAppend {
            audio: frame.to_string(),
        })
    }

    /// Encode raw audio bytes and forward them as one chunk.
    pub fn append_pcm(&self, samples: &[u8]) -> bool {
        if samples.is_empty() {
            debug!("Skipping empty audio frame");
            return false;
        }
        self.append_audio(&STANDARD.encode(samples))
    }

    /// Close the current utterance. Returns `false` when nothing was sent.
    pub fn commit(&self) -> bool {
        if !self.shared.is_open() {
            return false;
        }
        self.shared.send(&ClientEvent::InputAudioBufferCommit)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BridgeConfig;
    use crate::realtime::RealtimeSession;

    #[test]
    fn relay_without_open_session_sends_nothing() {
        let session = RealtimeSession::new(BridgeConfig::default());
        let relay = session.relay();
        assert!(!relay.is_open());
        assert!(!relay.append_audio("AAAA"));
        assert!(!relay.append_pcm(&[0, 1, 2]));
        assert!(!relay.commit());
    }

    #[test]
    fn empty_frames_are_rejected() {
        let session = RealtimeSession::new(BridgeConfig::default());
        let relay = session.relay();
        assert!(!relay.append_audio(""));
        assert!(!relay.append_pcm(&[]));
    }
}
