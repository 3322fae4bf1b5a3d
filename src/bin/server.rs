//! Marina Server Binary
//!
//! Serves an in-memory collection over TCP.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use marina::collection::Collection;
use marina::config::Backpressure;
use marina::{Server, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Marina Server
#[derive(Parser, Debug)]
#[command(name = "marina-server")]
#[command(about = "Shared collection server with bounded admission")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7474")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Threads in the compute pool
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Queued computations before backpressure applies
    #[arg(short, long, default_value = "128")]
    queue_capacity: usize,

    /// Compute pool policy when full: block or reject
    #[arg(short, long, default_value = "block")]
    backpressure: Backpressure,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,marina=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Marina Server v{}", marina::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let config = ServerConfig::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .worker_threads(args.workers)
        .task_queue_capacity(args.queue_capacity)
        .backpressure(args.backpressure)
        .build();

    let mut server = Server::new(config, Arc::new(Collection::new()));
    match server.run() {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
