use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod encoding;
mod error;
mod proxy;
mod router;
mod sd;

use config::ServiceConfig;

#[derive(Parser, Debug)]
#[command(name = "porta")]
#[command(about = "An HTTP API gateway aggregating backend endpoints")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "etc/porta.yaml")]
    config: String,

    /// Port of the service, overriding the configuration
    #[arg(short, long, default_value_t = 0)]
    port: u16,

    /// Enable the debug endpoints
    #[arg(short, long)]
    debug: bool,

    /// Logging level
    #[arg(short, long, default_value = "error")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("porta={}", args.log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut service_config = ServiceConfig::from_file(&args.config)?;
    service_config.debug = service_config.debug || args.debug;
    if args.port != 0 {
        service_config.port = args.port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config,
        port = service_config.port,
        endpoints = service_config.endpoints.len(),
        "starting porta"
    );

    router::run(service_config).await
}
