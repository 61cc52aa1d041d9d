//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, body buffering, upgrade capture)
//!     → buffered.rs (in-memory sink, takeover-capable on Upgrade)
//!     → [decorator chain: gzip → proxy_redirect → access_log]
//!     → application handler (e.g. files.rs)
//!     → BufferedSink → Axum response → client
//! ```

pub mod buffered;
pub mod files;
pub mod server;
pub mod sink;
pub mod sniff;

pub use buffered::BufferedSink;
pub use files::FileServer;
pub use server::{shutdown_signal, HttpServer};
pub use sink::{
    handler_fn, Detached, Handler, HandlerFn, ResponseSink, ResponseWriter, Takeover,
    TakeoverSink,
};
