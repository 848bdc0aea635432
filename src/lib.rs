//! voxbridge: telephony audio to realtime speech API bridge.
//!
//! Opens a realtime speech session, negotiates its audio profile, keeps it
//! alive, and forwards caller audio frames with explicit commit boundaries.
//! Server frames are classified and broadcast to subscribers.
//!
//! # Quick Start
//!
//! ```no_run
//! use voxbridge::config::BridgeConfig;
//! use voxbridge::realtime::RealtimeSession;
//!
//! # async fn example() -> voxbridge::error::Result<()> {
//! let mut session = RealtimeSession::new(BridgeConfig::from_env()?);
//! session.connect().await?;
//!
//! let relay = session.relay();
//! relay.append_pcm(&[0x7f; 160]);
//! relay.commit();
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod realtime;
pub mod telephony;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
