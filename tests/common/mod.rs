//! Shared utilities for integration testing.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use respwrap::config::ServerConfig;
use respwrap::http::{Handler, HttpServer};
use respwrap::middleware::{AccessLogWriter, LogRecord};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A server running on an ephemeral port. Dropping it stops the server.
pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start `handler` behind an `HttpServer` on 127.0.0.1.
pub async fn spawn_server(config: ServerConfig, handler: impl Handler) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = HttpServer::new(config, handler);
    tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        server.run(listener, shutdown).await.unwrap();
    });

    TestServer {
        addr,
        _shutdown: tx,
    }
}

/// Collects access log records in memory.
#[derive(Default)]
pub struct MemoryLog(Mutex<Vec<LogRecord>>);

impl MemoryLog {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[allow(dead_code)]
    pub fn records(&self) -> Vec<LogRecord> {
        self.0.lock().unwrap().clone()
    }
}

impl AccessLogWriter for MemoryLog {
    fn write_record(&self, record: &LogRecord) -> io::Result<()> {
        self.0.lock().unwrap().push(record.clone());
        Ok(())
    }
}
