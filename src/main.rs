//! mcp-probe - interactive console for MCP tool servers.
//!
//! Parses the command line, establishes the channel to the server, and runs
//! the prompt loop on stdin/stdout until end of input or Ctrl+C.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcp_probe::config::Args;
use mcp_probe::ipc::DuplexChannel;
use mcp_probe::session::{Session, SessionEnd};

/// How long runtime shutdown waits for the blocking stdin reader.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so it never mixes with responses on stdout)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(args.log_filter()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    info!("Starting mcp-probe v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(run(args));

    // The stdin reader may still be parked in a blocking read; don't wait on it
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    } else {
        info!("mcp-probe exited cleanly");
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;

    let channel = DuplexChannel::open(&config.transport, config.framing)
        .await
        .context("Failed to establish channel to MCP server")?;
    println!(
        "Connected to {}. Type 'help' for commands, Ctrl+D or Ctrl+C to exit.",
        channel.label()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let session = Session::new(channel, config.response_timeout).with_shutdown(shutdown_rx);
    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    let end = session
        .run(input, &mut stdout)
        .await
        .context("Console I/O failed")?;
    if end == SessionEnd::Interrupted {
        println!();
    }

    Ok(())
}
