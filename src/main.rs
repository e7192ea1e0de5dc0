use std::path::PathBuf;

use clap::Parser;
use eyre::Result;

use calmon_auth::config::{default_config, load_config};
use calmon_auth::server::start_server;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Calmon Academy authentication gateway
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Bind address for the server
    #[clap(short, long, value_parser)]
    bind: Option<String>,

    /// Enable verbose logging (can be specified multiple times)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "calmon_auth=info,tower_http=debug".into()),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {}", config_path.display());
            match load_config(&config_path.to_string_lossy()) {
                Ok(config) => config,
                Err(err) => {
                    warn!("Failed to load configuration: {}", err);
                    warn!("Using default configuration instead");
                    default_config()
                }
            }
        }
        None => {
            info!("Using default configuration");
            default_config()
        }
    };

    if let Some(bind) = cli.bind {
        config.listen_addr = bind.parse()?;
    }

    info!("Starting auth gateway on {}", config.listen_addr);
    start_server(config).await
}
