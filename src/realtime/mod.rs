//! Realtime speech session (WebSocket-based).

pub mod events;
mod keepalive;
pub mod messages;
pub mod negotiation;
pub mod relay;
pub mod session;

pub use events::{classify, InboundMessage, SessionEvent};
pub use messages::ClientEvent;
pub use negotiation::SessionConfig;
pub use relay::AudioRelay;
pub use session::{RealtimeSession, SessionState};
