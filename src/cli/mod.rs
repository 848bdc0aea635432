//! CLI entry point for voxbridge.

pub mod simulate;

use clap::{Parser, Subcommand};

/// voxbridge realtime bridge CLI
#[derive(Parser, Debug)]
#[command(name = "voxbridge", version, about = "voxbridge: realtime speech bridge CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a simulated call through a live realtime session
    Simulate(SimulateArgs),
    /// Print the resolved configuration (credential redacted)
    CheckConfig,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of media frames to send
    #[arg(long, default_value_t = 120)]
    pub frames: usize,

    /// Bytes of audio per frame
    #[arg(long, default_value_t = 160)]
    pub frame_bytes: usize,

    /// Commit after this many frames (0 commits only on stop)
    #[arg(long, default_value_t = 50)]
    pub commit_every: usize,

    /// Pause between frames in milliseconds
    #[arg(long, default_value_t = 10)]
    pub frame_interval_ms: u64,

    /// How long to keep printing server events after the stream stops
    #[arg(long, default_value_t = 1500)]
    pub linger_ms: u64,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_simulate_with_defaults() {
        let cli = Cli::try_parse_from(["voxbridge", "simulate"]).unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.frames, 120);
                assert_eq!(args.frame_bytes, 160);
                assert_eq!(args.commit_every, 50);
                assert_eq!(args.frame_interval_ms, 10);
                assert_eq!(args.linger_ms, 1500);
            }
            other => panic!("expected Simulate, got {other:?}"),
        }
    }

    #[test]
    fn parse_simulate_with_overrides() {
        let cli = Cli::try_parse_from([
            "voxbridge",
            "simulate",
            "--frames",
            "10",
            "--commit-every",
            "0",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.frames, 10);
                assert_eq!(args.commit_every, 0);
            }
            other => panic!("expected Simulate, got {other:?}"),
        }
    }

    #[test]
    fn parse_check_config() {
        let cli = Cli::try_parse_from(["voxbridge", "check-config"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["voxbridge"]).is_err());
    }
}
