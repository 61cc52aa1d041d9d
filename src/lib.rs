//! HTTP response decorators: gzip compression, access logging, and redirect
//! rewriting for applications mounted behind a reverse proxy.

pub mod config;
pub mod http;
pub mod middleware;
pub mod observability;

pub use config::ServerConfig;
pub use http::{Handler, HttpServer, ResponseSink, ResponseWriter};
pub use observability::LogFile;
