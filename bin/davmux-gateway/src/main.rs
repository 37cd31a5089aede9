//! davmux Gateway - composite WebDAV server
//!
//! Serves one WebDAV tree whose top-level folders are other WebDAV servers.

mod setup;

use anyhow::Result;
use clap::Parser;
use setup::Overrides;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "davmux-gateway")]
#[command(about = "davmux composite WebDAV gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/davmux/gateway.toml")]
    config: PathBuf,

    /// Listen address (overrides config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Name of the folder that holds every backend (overrides config file)
    #[arg(long)]
    static_root: Option<String>,

    /// PROPFIND cache TTL in seconds (overrides config file)
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let overrides = Overrides {
        listen: args.listen.clone(),
        static_root: args.static_root.clone(),
        cache_ttl_secs: args.cache_ttl,
    };

    let config = setup::load_config(&args.config, &overrides)?;
    let log_level = args.log_level.clone().unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting davmux gateway");
    info!("Config file: {}", args.config.display());

    let router = setup::build_router(&config)?;

    #[cfg(unix)]
    spawn_reload_on_hangup(
        Arc::clone(&router),
        args.config.clone(),
        overrides,
        config.cache.ttl(),
    )?;

    let app = Arc::clone(&router)
        .into_router()
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .gateway
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", config.gateway.listen, e))?;

    info!("Starting WebDAV server on {}", addr);

    // Start server
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    router.shutdown();
    info!("Gateway shut down gracefully");

    Ok(())
}

/// Re-read the configuration file on every SIGHUP
#[cfg(unix)]
fn spawn_reload_on_hangup(
    router: Arc<davmux_composite::CompositeRouter>,
    path: PathBuf,
    overrides: Overrides,
    ttl: std::time::Duration,
) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading {}", path.display());
            if let Err(e) = setup::reload(&router, &path, &overrides, ttl) {
                tracing::error!("Reload failed, keeping current backends: {:#}", e);
            }
        }
    });
    Ok(())
}
