//! voxbridge CLI binary entry point.

use tracing_subscriber::EnvFilter;
use voxbridge::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxbridge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Simulate(args) => voxbridge::cli::simulate::handle_simulate(args).await,
        Commands::CheckConfig => voxbridge::cli::simulate::handle_check_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
