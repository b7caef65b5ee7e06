use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wxgate::config::{Config, Overrides};
use wxgate::gateway::Gateway;

#[derive(Parser)]
#[command(name = "wxgate", version, about = "HTTP gateway for a remote chat automation endpoint")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, env = "WXGATE_CONFIG", default_value = "wxgate.yaml")]
    config: PathBuf,

    /// HTTP API port
    #[arg(long, env = "RUN_PORT")]
    port: Option<u16>,

    /// Port the remote endpoint pushes messages to
    #[arg(long, env = "MSG_LISTENER_PORT")]
    callback_port: Option<u16>,

    /// Base URL of the remote endpoint
    #[arg(long, env = "VIRTUAL_MACHINE_URL")]
    remote_url: Option<String>,

    /// Redis address for the message buffer (`host:port` or `redis://...`)
    #[arg(long, env = "MSG_QUEUE_ADDR")]
    queue_addr: Option<String>,

    /// Directory shared with the remote endpoint
    #[arg(long, env = "TEMP_DIR")]
    temp_dir: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            callback_port: self.callback_port,
            remote_url: self.remote_url.clone(),
            queue_addr: self.queue_addr.clone(),
            temp_dir: self.temp_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    config.apply(cli.overrides());
    config.validate()?;

    info!(
        port = config.server.port,
        callback_port = config.callback.port,
        remote = %config.remote.base_url,
        "Starting gateway"
    );

    let gateway = Gateway::new(config).await?;
    let cause = gateway
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(%cause, "Exiting");
    Ok(())
}
