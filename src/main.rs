//! Mixgate CLI - run the mix-net gateway standalone
//!
//! Bridges TCP byte streams onto fixed-size mix-net messages and serves the
//! reassembled output over HTTP. Without a mix-net attached, a loopback
//! driver runs the lightning rounds locally.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mixgate_lib::{start, GatewayConfig, LoopbackMix, LoopbackMixConfig};

/// Mixgate - bridge TCP streams onto a round-based mix-net
#[derive(Parser, Debug)]
#[command(name = "mixgate")]
#[command(about = "Mixgate - bridge TCP streams onto a round-based mix-net")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway with a local loopback mix
    #[command(long_about = r#"
Run the gateway standalone: a TCP listener packetizes incoming byte
streams into fixed-size frames, loopback lightning rounds carry them
across, and an HTTP listener serves the reassembled streams back out.

EXAMPLES:
  # Pipe data through the gateway
  mixgate run --message-size 1024 \
    --addr-in 127.0.0.1:9000 \
    --addr-out 127.0.0.1:9001
  echo "hello" | nc 127.0.0.1 9000
  curl http://127.0.0.1:9001/

ENVIRONMENT VARIABLES:
  MIXGATE_MESSAGE_SIZE       Mix-net message size in bytes
  MIXGATE_ADDR_IN            TCP ingress listen address
  MIXGATE_ADDR_OUT           HTTP egress listen address
  MIXGATE_CLIENTS            Loopback mix client count
  MIXGATE_ROUND_INTERVAL_MS  Loopback round interval in milliseconds
    "#)]
    Run {
        /// Mix-net message size in bytes; every frame is padded to this length
        #[arg(long, env = "MIXGATE_MESSAGE_SIZE", default_value = "1024")]
        message_size: usize,

        /// TCP listen address for incoming data streams
        #[arg(long, env = "MIXGATE_ADDR_IN", default_value = "127.0.0.1:9000")]
        addr_in: String,

        /// HTTP listen address for serving outgoing data streams
        #[arg(long, env = "MIXGATE_ADDR_OUT", default_value = "127.0.0.1:9001")]
        addr_out: String,

        /// Number of loopback mix clients (one message each per round)
        #[arg(long, env = "MIXGATE_CLIENTS", default_value = "8")]
        clients: usize,

        /// Milliseconds between loopback rounds
        #[arg(long, env = "MIXGATE_ROUND_INTERVAL_MS", default_value = "50")]
        round_interval_ms: u64,
    },
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            message_size,
            addr_in,
            addr_out,
            clients,
            round_interval_ms,
        } => {
            let config = GatewayConfig::from_parts(message_size, true, &addr_in, &addr_out)
                .context("Invalid gateway configuration")?;

            info!(
                "Starting gateway: message size {} bytes, ingress {}, egress {}",
                message_size, addr_in, addr_out
            );

            let gateway = start(config).context("Failed to start gateway")?;

            info!(
                "Loopback mix running {} clients every {} ms",
                clients, round_interval_ms
            );

            let mix = LoopbackMix::new(
                LoopbackMixConfig {
                    num_clients: clients,
                    round_interval: Duration::from_millis(round_interval_ms),
                },
                gateway,
            );
            mix.run().await;

            Ok(())
        }
    }
}
