//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Diagnostics (all subsystems)
//!     → tracing macros
//!     → logging.rs (subscriber, filter from RUST_LOG or config)
//!     → stdout
//!
//! Access records (middleware::access_log)
//!     → log_file.rs (append-only, self-healing)
//!     → file on disk
//! ```
//!
//! # Design Decisions
//! - Structured fields on every diagnostic event
//! - The access log file is shared by all requests behind one lock

pub mod log_file;
pub mod logging;

pub use log_file::{LogFile, LogFileError};
