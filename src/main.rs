use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rover_drive_runtime::config::{ControlConfig, LOOP_HZ, MAX_LOOP_HZ, MIN_LOOP_HZ};
use rover_drive_runtime::runtime::{self, RunOptions};

/// Closed-loop steering and drive control for the rover
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// JSON file with control gains, thresholds and geometry
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control loop frequency in Hz
    #[arg(long, default_value_t = LOOP_HZ, value_parser = clap::value_parser!(u64).range(MIN_LOOP_HZ..=MAX_LOOP_HZ))]
    loop_hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match args.config {
        Some(path) => match ControlConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(2);
            }
        },
        None => ControlConfig::default(),
    };

    let options = RunOptions {
        config,
        loop_hz: args.loop_hz,
    };
    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
