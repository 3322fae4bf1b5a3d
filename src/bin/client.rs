//! Marina Client Binary
//!
//! Interactive console client for a Marina server.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use marina::client::Console;
use marina::{ClientConfig, ClientOutcome, ClientSession};
use tracing_subscriber::{fmt, EnvFilter};

/// Marina Client
#[derive(Parser, Debug)]
#[command(name = "marina-client")]
#[command(about = "Console client for a Marina collection server")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7474")]
    server: String,

    /// Delay between reconnection attempts in milliseconds
    #[arg(short = 'd', long, default_value = "2000", allow_negative_numbers = true)]
    reconnect_delay_ms: i64,

    /// Consecutive failed connection attempts before giving up
    #[arg(short = 'a', long, default_value = "5")]
    max_attempts: u32,

    /// Connect timeout in milliseconds (0 = OS default)
    #[arg(short = 't', long, default_value = "5000")]
    connect_timeout_ms: u64,
}

fn main() -> ExitCode {
    // Logs go to stderr so they don't mix with the console dialogue
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = ClientConfig::builder()
        .server_addr(&args.server)
        .reconnect_delay_ms(args.reconnect_delay_ms)
        .max_reconnect_attempts(args.max_attempts)
        .connect_timeout_ms(args.connect_timeout_ms)
        .build();

    let console = Console::new(io::stdin().lock(), io::stdout());
    let mut client = ClientSession::new(config, console);

    match client.run() {
        Ok(ClientOutcome::Finished) | Ok(ClientOutcome::AttemptsExhausted) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Client error: {}", e);
            ExitCode::FAILURE
        }
    }
}
