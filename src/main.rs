//! festival-gate
//!
//! Guarded JSON API for festival profiles and event registration.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                    festival-gate                      │
//!                   │                                                       │
//!   Client Request  │  ┌──────────┐   ┌───────────┐   ┌────────────────┐   │
//!   ────────────────┼─▶│   edge   │──▶│ rate limit│──▶│  auth verifier │───┼──▶ Identity
//!                   │  │   gate   │   │ (purpose) │   │ (+ cache)      │   │    Provider
//!                   │  └──────────┘   └───────────┘   └───────┬────────┘   │
//!                   │                                         ▼            │
//!   Client Response │  ┌──────────────────┐          ┌────────────────┐   │
//!   ◀───────────────┼──│ error classifier │◀─────────│    handlers    │───┼──▶ Document
//!                   │  └──────────────────┘          └────────────────┘   │    Store
//!                   │                                                       │
//!                   │  config · observability · lifecycle                   │
//!                   └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use festival_gate::config::{load_config, load_from_env};
use festival_gate::lifecycle::{launch, signals, Shutdown};
use festival_gate::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "festival-gate", version, about = "Guarded festival registration API")]
struct Args {
    /// Path to a TOML config file. Defaults plus environment overrides when omitted.
    #[arg(short, long, env = "FESTIVAL_GATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability, config.environment);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        bind_address = %config.listener.bind_address,
        "festival-gate starting"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    launch(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
