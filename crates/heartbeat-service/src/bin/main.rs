//! Heartbeat monitor entry point
//!
//! Probes the configured services, records their liveness and serves the read
//! API until Ctrl-C or SIGTERM.

use clap::{Parser, Subcommand};
use heartbeat_core::{HeartbeatMonitor, MemoryBus, MemoryStatusStore, MemoryTimeSeries};
use heartbeat_service::handler::{create_router, AppState};
use heartbeat_service::loopback;
use heartbeat_service::settings::{LogSettings, Settings};
use heartbeat_span::LogTracer;
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "heartbeat-monitor")]
#[command(about = "Heartbeat monitor - service liveness over a pub/sub bus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitor and the read API
    Run {
        /// Settings file (YAML, TOML or JSON)
        #[arg(short, long, env = "HEARTBEAT_CONFIG")]
        config: PathBuf,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Log filter directive
        #[arg(long, env = "RUST_LOG")]
        log_level: Option<String>,
    },

    /// Validate a settings file and print the monitored services
    CheckConfig {
        /// Settings file (YAML, TOML or JSON)
        #[arg(short, long, env = "HEARTBEAT_CONFIG")]
        config: PathBuf,
    },
}

fn init_tracing(log: &LogSettings) {
    let filter = tracing_subscriber::EnvFilter::try_new(&log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(log.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!log.json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => return,
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = settings.bind_address().parse()?;
    let registry = Registry::new();
    let bus = Arc::new(MemoryBus::new());

    let monitor = Arc::new(
        HeartbeatMonitor::new(
            settings.monitor.clone(),
            bus.clone(),
            Arc::new(MemoryStatusStore::new()),
            Arc::new(MemoryTimeSeries::new()),
            &registry,
        )?
        .with_tracer(Arc::new(LogTracer)),
    );
    let shutdown = monitor.shutdown_token();

    let responders = TaskTracker::new();
    if settings.loopback {
        loopback::spawn(bus.clone(), &settings.monitor, shutdown.clone(), &responders).await?;
    }

    monitor.start().await?;
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let router = create_router(Arc::new(AppState::new(Arc::clone(&monitor), registry)));
    tracing::info!(
        version = heartbeat_core::VERSION,
        address = %addr,
        services = settings.monitor.services.len(),
        "Starting heartbeat monitor"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    monitor.shutdown().await;
    responders.close();
    responders.wait().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            port,
            log_level,
        } => {
            let settings = Settings::from_file(&config)?.with_overrides(port, log_level);
            init_tracing(&settings.log);
            run(settings).await?;
        }

        Commands::CheckConfig { config } => {
            let settings = Settings::from_file(&config)?;
            let services: Vec<_> = settings
                .monitor
                .services
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "name": s.name,
                        "probed": s.is_probed(),
                        "endpoint": s.endpoint,
                        "interval_seconds": s.interval_seconds,
                    })
                })
                .collect();

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "reply_topic": settings.monitor.reply_topic,
                    "listen": settings.bind_address(),
                    "loopback": settings.loopback,
                    "services": services,
                }))?
            );
        }
    }

    Ok(())
}
