/*!
 * A2DP Pairing Agent
 * BlueZ agent that only lets audio sinks connect
 */

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

mod agent;
mod bluez;
mod config;
mod error;
mod lifecycle;
mod policy;

use bluez::SystemBus;
use config::{AgentConfig, DEFAULT_CONFIG_PATH};
use lifecycle::AgentLifecycle;

#[derive(Parser)]
#[command(name = "a2dp-agent")]
#[command(about = "Bluetooth agent that accepts A2DP connections")]
struct Cli {
    /// Bluetooth adapter, e.g. hci0
    device: String,

    /// Enable debug messages
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("a2dp_agent={}", log_level))
        .init();

    run_agent(&cli.device).await
}

async fn run_agent(adapter: &str) -> Result<()> {
    let config = AgentConfig::load(DEFAULT_CONFIG_PATH)?;
    let shutdown = shutdown_signal()?;

    info!("Connecting to system bus");
    let bus = SystemBus::connect(config.call_timeout()).await?;

    let mut lifecycle = AgentLifecycle::new(bus, config);
    let outcome = lifecycle.run(adapter, shutdown).await;
    if let Err(e) = outcome {
        return Err(e).with_context(|| {
            format!("agent startup on {} stopped while {}", adapter, lifecycle.state())
        });
    }
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    let mut interrupt = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}
