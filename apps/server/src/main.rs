//! sendspind - Standalone multi-room synchronized audio streaming server.
//!
//! Runs the streaming tick loop against a built-in tone source and serves
//! the sendspin WebSocket protocol for any number of player clients.

mod config;
mod source;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::signal;

use sendspin_core::bootstrap_services;
use sendspin_core::protocol::{AudioFormat, Codec};
use sendspin_core::protocol_constants::WS_PATH;
use sendspin_core::server::{AudioSource, StreamingPipeline};

use crate::config::ServerConfig;
use crate::source::ToneSource;

/// Grace window after shutdown begins before remaining connection and
/// listener tasks are forcibly aborted.
const SHUTDOWN_GRACE_SECS: u64 = 5;

/// sendspind - standalone sendspin streaming server.
#[derive(Parser, Debug)]
#[command(name = "sendspind")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SENDSPIN_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "SENDSPIN_BIND_PORT")]
    port: Option<u16>,

    /// Bind address (overrides config file).
    #[arg(short = 'b', long, env = "SENDSPIN_BIND_ADDR")]
    bind: Option<std::net::IpAddr>,

    /// Frequency of the built-in tone source, in Hz.
    #[arg(long, default_value_t = 440.0, env = "SENDSPIN_TONE_HZ")]
    tone_hz: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("sendspind v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    log::info!(
        "configuration: bind={}:{}, source={}Hz/{}ch",
        config.bind,
        config.port,
        config.source_sample_rate,
        config.source_channels
    );

    let source_format = AudioFormat::new(
        Codec::Pcm,
        config.source_sample_rate,
        config.source_channels,
        24,
    );
    let services = Arc::new(bootstrap_services(source_format));

    let pipeline = StreamingPipeline::new(Arc::clone(&services.registry), Arc::clone(&services.clock));
    let source: Box<dyn AudioSource> =
        Box::new(ToneSource::new(config.source_sample_rate, config.source_channels, args.tone_hz));
    let pipeline_cancel = services.cancel_token.clone();
    let pipeline_handle = tokio::spawn(async move {
        pipeline.run(source, pipeline_cancel).await;
    });

    let app = Router::new()
        .route(WS_PATH, get(ws::ws_handler))
        .with_state(Arc::clone(&services));

    let addr = std::net::SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}{WS_PATH}");

    let server_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::error!("server error: {err}");
        }
    });

    shutdown_signal().await;
    log::info!("shutdown signal received, cleaning up");

    services.shutdown().await;

    // Give in-flight connections a grace window to observe their cancelled
    // token and close cleanly before the tick loop and listener are aborted
    // out from under them.
    tokio::time::sleep(std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;

    pipeline_handle.abort();
    server_handle.abort();

    log::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
