//! Trading stack control plane.
//!
//! Owns the shared configuration document for a set of containerized
//! trading workers and rolls edits out to them safely.
//!
//! # Architecture Overview
//!
//! ```text
//!   admin API / stackctl                      config/config.toml
//!          │                                        ▲     │
//!          ▼                                        │     ▼ (notify)
//!   ┌─────────────────────┐   write_with_backup   ┌─┴───────────────┐
//!   │ OrchestrationCtl    │──────────────────────▶│ ConfigPersistence│
//!   │ pause → persist →   │                       └────────┬────────┘
//!   │ unpause → signal    │                                │
//!   └──────┬───────┬──────┘                       ┌────────▼────────┐
//!          │       └── replace ──────────────────▶│   ConfigStore    │◀── ChangeWatcher
//!          ▼                                      └────────▲────────┘
//!   ┌─────────────────────┐                                │
//!   │ WorkerRegistry      │◀──── StatusAggregator ─────────┘ (broker probe)
//!   │ (Docker, by label)  │
//!   └─────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use trader_control::config::settings::{load_settings, ControlSettings};
use trader_control::lifecycle::{signals, ControlPlane};
use trader_control::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "trader-control")]
#[command(about = "Configuration and worker control plane for the trading stack", long_about = None)]
struct Args {
    /// Control-plane settings file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => ControlSettings::default(),
    };

    logging::init_logging(&settings.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "trader-control starting");

    tracing::info!(
        config_path = %settings.paths.config_path.display(),
        backup_dir = %settings.paths.backup_dir.display(),
        label = %format!("{}={}", settings.workers.label_key, settings.workers.label_value),
        "Settings loaded"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut plane = ControlPlane::build(settings);
    plane.start()?;

    let signal_shutdown = plane.shutdown().clone();
    tokio::spawn(async move { signals::shutdown_on_signal(&signal_shutdown).await });

    let served = plane.serve_admin().await;
    if plane.settings.admin.enabled {
        // Admin server returns on shutdown or on bind failure.
        plane.shutdown().trigger();
    } else {
        plane.shutdown().wait().await;
    }

    plane.stop().await;
    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
