//! rtugate command line

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rtugate::{gateway, EchoStub, GatewayConfig, RtuConfig, Server, TcpFraming};

#[derive(Debug, Parser)]
#[command(name = "rtugate", version, about = "Modbus RTU to TCP bypass gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bridge TCP clients onto a serial RTU bus
    Gateway(GatewayArgs),

    /// Answer register reads with zeros, without a bus
    Stub(ListenArgs),
}

#[derive(Debug, Args)]
struct ListenArgs {
    /// TCP listen address
    #[arg(long, env = "RTUGATE_LISTEN", default_value = "0.0.0.0:502")]
    listen: SocketAddr,

    /// Treat each socket read as one frame instead of following the MBAP length
    #[arg(long, env = "RTUGATE_LEGACY_TCP_READ")]
    legacy_tcp_read: bool,
}

impl ListenArgs {
    fn framing(&self) -> TcpFraming {
        if self.legacy_tcp_read {
            TcpFraming::SingleRead
        } else {
            TcpFraming::Mbap
        }
    }
}

#[derive(Debug, Args)]
struct GatewayArgs {
    /// Serial device of the RTU bus
    #[arg(long, env = "RTUGATE_SERIAL_PORT")]
    serial_port: String,

    /// Serial baud rate (9600, 19200 or 38400)
    #[arg(long, env = "RTUGATE_BAUD_RATE", default_value_t = 38400)]
    baud_rate: u32,

    /// Quiet time between bus transactions
    #[arg(long, env = "RTUGATE_POLL_DELAY_MS", default_value_t = 20)]
    poll_delay_ms: u64,

    /// Extra quiet time after a failed transaction
    #[arg(long, env = "RTUGATE_ERROR_DELAY_MS", default_value_t = 200)]
    error_delay_ms: u64,

    /// Response timeout for each bus transaction
    #[arg(long, env = "RTUGATE_TIMEOUT_MS", default_value_t = 1000)]
    timeout_ms: u64,

    #[command(flatten)]
    listen: ListenArgs,
}

impl GatewayArgs {
    fn config(&self) -> GatewayConfig {
        GatewayConfig {
            serial_port: self.serial_port.clone(),
            rtu: RtuConfig::default()
                .with_baud_rate(self.baud_rate)
                .with_delay_between_polls(Duration::from_millis(self.poll_delay_ms))
                .with_error_delay(Duration::from_millis(self.error_delay_ms)),
            listen: self.listen.listen,
            response_timeout: Duration::from_millis(self.timeout_ms),
            tcp_framing: self.listen.framing(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Gateway(args) => {
            let config = args.config();
            let server = gateway::bind(&config)
                .await
                .context("failed to start gateway")?;

            info!(listen = %config.listen, port = %config.serial_port, "Gateway started");
            server.run().await?;
        }
        Command::Stub(args) => {
            let server = Server::bind(args.listen, Arc::new(EchoStub))
                .await
                .with_context(|| format!("failed to bind {}", args.listen))?
                .with_framing(args.framing());

            info!(listen = %args.listen, "Echo stub started");
            server.run().await?;
        }
    }

    Ok(())
}
