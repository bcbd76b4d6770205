//! stockmq-server: market data gateway binary
//!
//! Connects to the configured exchange WebSockets, normalizes their frames and
//! publishes canonical events to NATS and the enabled stores.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stockmq_connector::{spawn_signal_handler, Server};
use stockmq_metadata::{LoggerConfig, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "stockmq-server")]
#[command(about = "Market data gateway from exchange WebSockets to NATS")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "STOCKMQ_CONFIG")]
    config: Option<PathBuf>,

    /// NATS server URL, overrides `nats.url`
    #[arg(short, long, env = "STOCKMQ_NATS_URL")]
    nats_url: Option<String>,

    /// Monitor bind address, overrides `monitor.bind`
    #[arg(short, long, env = "STOCKMQ_MONITOR_BIND")]
    monitor_bind: Option<String>,

    /// Log at debug level regardless of RUST_LOG and config
    #[arg(short, long)]
    debug: bool,
}

fn init_tracing(logger: &LoggerConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logger.level))
    };

    if logger.json {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(url) = args.nats_url {
        config.nats.url = url;
    }
    if let Some(bind) = args.monitor_bind {
        config.monitor.bind = bind;
    }

    init_tracing(&config.logger, args.debug);
    info!(
        config = ?args.config,
        nats_url = %config.nats.url,
        monitor = %config.monitor.bind,
        sources = config.enabled_sources().count(),
        "stockmq-server starting"
    );

    let server = Arc::new(Server::new(config)?);
    if let Err(e) = server.start().await {
        error!(error = %e, "startup failed");
        server.shutdown().await;
        return Err(e.into());
    }

    spawn_signal_handler(Arc::clone(&server));
    server.wait_for_shutdown().await;

    info!("stockmq-server stopped");
    Ok(())
}
