//! respwrap: serves a directory through the response decorator stack.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ gzip ──▶ proxy_redirect ──▶ access_log ──▶ FileServer
//!                      (axum, body          │                         │
//!                       buffering)          │                         ▼
//!                                           │                   LogFile / tracing
//!     Client Response                       ▼
//!     ◀────────────── BufferedSink ◀── compressed body, rewritten Location
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use respwrap::config::{load_config, ServerConfig};
use respwrap::http::{shutdown_signal, FileServer, HttpServer};
use respwrap::middleware::{self, AccessLogWriter, TracingLog};
use respwrap::observability::{logging, LogFile};

#[derive(Parser)]
#[command(name = "respwrap")]
#[command(about = "Serve a directory with gzip, access logging and redirect rewriting", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file; defaults apply without one
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability.log_filter);
    tracing::info!("respwrap v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        root = %config.app.root.display(),
        compression = config.compression.enabled,
        base_path = ?config.proxy_redirect.base_path,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let log_file = match (&config.access_log.path, config.access_log.enabled) {
        (Some(path), true) => Some(Arc::new(LogFile::open(path, config.access_log.mode)?)),
        _ => None,
    };
    let log_writer: Option<Arc<dyn AccessLogWriter>> = match &log_file {
        Some(file) => Some(file.clone() as Arc<dyn AccessLogWriter>),
        None if config.access_log.enabled => Some(Arc::new(TracingLog) as Arc<dyn AccessLogWriter>),
        None => None,
    };

    #[cfg(unix)]
    if let Some(file) = &log_file {
        reopen_on_hangup(Arc::clone(file));
    }

    let handler = middleware::stack(&config, FileServer::new(&config.app.root), log_writer);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(config, handler)
        .run(listener, shutdown_signal())
        .await?;

    if let Some(file) = log_file {
        if let Err(e) = file.close() {
            tracing::warn!(path = %file.path().display(), error = %e, "Failed to close access log");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Recreate the access log on `SIGHUP`, the usual post-rotation signal.
#[cfg(unix)]
fn reopen_on_hangup(file: Arc<LogFile>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let target = Arc::clone(&file);
            match tokio::task::spawn_blocking(move || target.recreate()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(path = %file.path().display(), error = %e, "Failed to reopen access log");
                }
                Err(e) => tracing::warn!(error = %e, "Access log reopen task failed"),
            }
        }
    });
}
