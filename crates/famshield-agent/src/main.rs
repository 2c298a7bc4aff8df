use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use famshield_agent::{daemon, AgentConfig};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "famshield-agent")]
#[command(about = "FamShield on-device enforcement agent", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;
    let level = cli.log_level.clone().unwrap_or_else(|| config.general.log_level.clone());

    // stdout carries the bridge protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting FamShield agent");

    if let Err(e) = daemon::run(config).await {
        error!("Agent error: {:#}", e);
        return Err(e);
    }

    info!("FamShield agent stopped");
    Ok(())
}
