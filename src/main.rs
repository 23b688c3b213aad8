//! mqtt2http - MQTT-to-HTTP bridge
//!
//! Usage:
//!   mqtt2http [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>       Configuration file path
//!   --authorize-url <URL>     Credential check endpoint
//!   --publish-url <URL>       Default forward destination
//!   --api-bind <ADDR>         Admin API bind address (default: 0.0.0.0:8080)
//!   --metrics-bind <ADDR>     Metrics bind address (default: 0.0.0.0:9090)
//!   -l, --log-level           Log level (error, warn, info, debug, trace)
//!   -h, --help                Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mqtt2http::api::AdminServer;
use mqtt2http::bridge::Bridge;
use mqtt2http::config::Config;
use mqtt2http::hooks::Hooks;
use mqtt2http::metrics::{Metrics, MetricsServer};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::default(),
        }
    }

    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// mqtt2http - authenticate MQTT clients and forward publishes over HTTP
#[derive(Parser, Debug)]
#[command(name = "mqtt2http")]
#[command(version)]
#[command(about = "MQTT broker hooks that authenticate clients and forward publishes over HTTP")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Credential check endpoint
    #[arg(long)]
    authorize_url: Option<String>,

    /// Default forward destination (`{topic}` is substituted)
    #[arg(long)]
    publish_url: Option<String>,

    /// Admin API bind address
    #[arg(long)]
    api_bind: Option<SocketAddr>,

    /// Metrics bind address
    #[arg(long)]
    metrics_bind: Option<SocketAddr>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to register ctrl-c handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = term => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Environment overrides apply with or without a file
    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging - CLI overrides config
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    // CLI args override file config
    if let Some(url) = args.authorize_url {
        config.bridge.authorize_url = url;
    }
    if let Some(url) = args.publish_url {
        config.bridge.publish_url = url;
    }
    if let Some(bind) = args.api_bind {
        config.api.bind = bind;
    }
    if let Some(bind) = args.metrics_bind {
        config.metrics.bind = bind;
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let metrics = Arc::new(Metrics::new());
    let bridge = match Bridge::from_config(&config.bridge, metrics.clone()) {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            error!("Error initializing bridge: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting mqtt2http {}", env!("CARGO_PKG_VERSION"));
    info!("  Authorize URL: {}", config.bridge.authorize_url);
    info!("  Request timeout: {:?}", config.bridge.timeout);
    info!("  Routes: {}", bridge.routes().len());
    for route in bridge.routes().iter() {
        info!(
            "    - {}: /{}/ -> {}",
            route.name(),
            route.pattern(),
            route.destination()
        );
    }
    if bridge.routes().is_empty() {
        warn!("  No routes configured, published messages will not be forwarded");
    }

    let password = config.api.resolve_password();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    if config.metrics.enabled {
        info!("  Metrics: enabled (http://{}/metrics)", config.metrics.bind);
        let metrics_server = MetricsServer::new(metrics.clone(), config.metrics.bind);
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = metrics_server.run(shutdown).await {
                error!("Metrics server error: {}", e);
            }
        }));
    } else {
        info!("  Metrics: disabled");
    }

    info!("  Admin API: http://{}", config.api.bind);
    let admin_server = AdminServer::new(&bridge, Some(password), config.api.bind);
    let shutdown = shutdown_tx.subscribe();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = admin_server.run(shutdown).await {
            error!("Admin API error: {}", e);
        }
    }));

    // The protocol engine embedding this process drives `bridge` from here on
    bridge.on_started().await;

    shutdown_signal().await;
    info!("Shutting down");
    // Receivers may already be gone if a server failed to bind
    let _ = shutdown_tx.send(());
    bridge.on_stopped().await;

    let drain = async {
        for task in tasks {
            if let Err(e) = task.await {
                error!("Server task failed: {}", e);
            }
        }
    };
    if tokio::time::timeout(config.shutdown.grace, drain)
        .await
        .is_err()
    {
        warn!(
            "Shutdown grace period of {:?} elapsed, exiting anyway",
            config.shutdown.grace
        );
    }

    Ok(())
}
