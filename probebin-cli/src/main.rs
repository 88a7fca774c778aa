use clap::Parser;
use std::path::PathBuf;

use probebin_server::{Server, ServerConfig};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "probebin", about = "HTTP request and response inspection server")]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long = "log-level", default_value = "info")]
    log_level: Level,
    /// Write the effective configuration to this file and exit.
    #[arg(long = "write-config", value_name = "PATH")]
    write_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|err| err.to_string())?;

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path).map_err(|err| err.to_string())?,
        None => ServerConfig::default(),
    };
    if let Some(host) = cli.host {
        config.listen.host = host;
    }
    if let Some(port) = cli.port {
        config.listen.port = port;
    }
    if let Some(path) = &cli.write_config {
        config.save(path).map_err(|err| err.to_string())?;
        tracing::info!(path = %path.display(), "configuration written");
        return Ok(());
    }

    let server = Server::bind(config).await.map_err(|err| err.to_string())?;
    server.run().await.map_err(|err| err.to_string())
}
