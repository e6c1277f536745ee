//! pigeon
//!
//! Subscribes to MQTT topics per site and forwards every message to an
//! InfluxDB bucket named after the site. The configuration file is watched
//! and changes are applied without a restart.
//!
//! # Architecture Overview
//!
//! ```text
//!   pigeon.toml ──▶ ConfigWatcher ──▶ ConfigStore ──▶ ChangeBus
//!                    (debounced)       (ArcSwap)        │
//!                                                       ▼
//!   MQTT broker ◀── Pigeon (per site) ◀──────────── Flock
//!        │                │                             │
//!        └── message ─────┴──▶ site writer ──▶ InfluxDB bucket
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pigeon::broker::mqtt::MqttConnector;
use pigeon::database::influx::InfluxConnector;
use pigeon::lifecycle::startup::{self, Options};
use pigeon::observability::logging;

#[derive(Parser)]
#[command(name = "pigeon")]
#[command(about = "Bridge MQTT telemetry into InfluxDB", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "pigeon.toml")]
    config: PathBuf,

    /// Cool-down between configuration reloads, in milliseconds
    #[arg(long, default_value_t = 500)]
    debounce_ms: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Broker handshake and database request timeout, in seconds
    #[arg(long, default_value_t = 5)]
    connect_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init("pigeon=info");

    tracing::info!("pigeon v{} starting", env!("CARGO_PKG_VERSION"));

    let timeout = Duration::from_secs(args.connect_timeout_secs);
    let mut options = Options::new(args.config);
    options.debounce = Duration::from_millis(args.debounce_ms);
    options.metrics_address = args.metrics_address;

    let result = startup::run(
        options,
        Arc::new(MqttConnector::new(timeout)),
        Arc::new(InfluxConnector::new(timeout)),
    )
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "pigeon exiting");
        std::process::exit(e.exit_code());
    }
}
