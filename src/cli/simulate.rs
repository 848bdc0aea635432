//! `voxbridge simulate` and `voxbridge check-config` handlers.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use super::SimulateArgs;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::realtime::{InboundMessage, RealtimeSession, SessionEvent};
use crate::telephony::{synthetic_call, CommitPolicy, MediaStreamPump};

/// Connect, replay a synthetic call, linger for replies, close.
pub async fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let mut session = RealtimeSession::new(BridgeConfig::from_env()?);
    let mut events = session.subscribe();
    session.connect().await?;

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Inbound(message)) => print_message(&message),
                Ok(SessionEvent::Closed { code, reason }) => {
                    eprintln!("closed (code {code:?}): {reason}");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => eprintln!("… {skipped} events skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let policy = match args.commit_every {
        0 => CommitPolicy::Manual,
        every => CommitPolicy::EveryFrames(every),
    };
    let mut pump = MediaStreamPump::new(session.relay(), policy);
    let pacing = Duration::from_millis(args.frame_interval_ms);
    for event in synthetic_call(args.frames, args.frame_bytes) {
        pump.handle(event);
        tokio::time::sleep(pacing).await;
    }

    let stats = pump.stats();
    eprintln!(
        "sent {} frames ({} dropped), {} commits",
        stats.frames_forwarded, stats.frames_dropped, stats.commits
    );

    tokio::time::sleep(Duration::from_millis(args.linger_ms)).await;
    session.close().await;
    let _ = printer.await;
    Ok(())
}

/// Print the resolved configuration.
pub fn handle_check_config() -> Result<()> {
    let config = BridgeConfig::from_env()?;
    println!("url:            {}", config.realtime_url()?);
    println!(
        "api key:        {}",
        config
            .redacted_api_key()
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("user agent:     {}", config.user_agent);
    println!("voice:          {}", config.voice);
    println!("input format:   {}", config.input_format);
    println!("output format:  {}", config.output_format);
    println!("turn detection: {:?}", config.turn_detection);
    println!("keepalive:      {:?}", config.keepalive_interval);
    Ok(())
}

fn print_message(message: &InboundMessage) {
    match message {
        InboundMessage::SessionCreated { session_id } => {
            eprintln!("session created: {}", session_id.as_deref().unwrap_or("?"));
        }
        InboundMessage::SessionUpdated { .. } => eprintln!("session updated"),
        InboundMessage::AudioDelta { delta } => eprintln!("audio delta ({} bytes)", delta.len()),
        InboundMessage::TextDelta { text } => eprintln!("text: {text}"),
        InboundMessage::Error { message } => eprintln!("server error: {message}"),
        InboundMessage::Unknown { event_type, .. } => {
            eprintln!("event: {}", event_type.as_deref().unwrap_or("(untyped)"));
        }
    }
}
