//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that feeds every request to one handler chain
//! - Wire up middleware (tracing, timeout)
//! - Buffer request bodies up to the configured limit
//! - Run the synchronous handler chain on the blocking pool
//! - Hand the connection's upgrade to the sink when the client asks for one
//! - Bind server to listener and stop on the shutdown future

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::http::{BufferedSink, Handler};

/// Application state injected into the dispatcher.
#[derive(Clone)]
struct AppState {
    handler: Arc<dyn Handler>,
    max_body_bytes: usize,
}

/// HTTP server running one handler chain.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server serving `handler`.
    pub fn new(config: ServerConfig, handler: impl Handler) -> Self {
        let state = AppState {
            handler: Arc::new(handler),
            max_body_bytes: config.listener.max_body_bytes,
        };
        Self {
            router: Self::build_router(&config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for driving the server without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` completes.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Feed one request through the handler chain.
async fn dispatch(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let upgrade = request
        .headers()
        .contains_key(header::UPGRADE)
        .then(|| hyper::upgrade::on(&mut request));

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(
                error = %e,
                limit = state.max_body_bytes,
                "Request body rejected"
            );
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let request = Request::from_parts(parts, body);

    let handler = state.handler;
    let served = tokio::task::spawn_blocking(move || {
        let mut sink = match upgrade {
            Some(upgrade) => BufferedSink::with_upgrade(upgrade),
            None => BufferedSink::new(),
        };
        handler.serve(&request, &mut sink.writer());
        sink
    })
    .await;

    match served {
        Ok(sink) => sink.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Handler failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
