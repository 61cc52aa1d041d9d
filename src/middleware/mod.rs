//! Response decorators.
//!
//! # Data Flow
//! ```text
//! server adapter
//!     → gzip.rs (compress body when negotiated)
//!     → proxy_redirect.rs (prefix 3xx Location paths)
//!     → access_log.rs (capture status, bytes, latency)
//!     → application handler
//! ```
//!
//! Every decorator is `Wrap(handler) -> handler` and matches on the
//! [`ResponseWriter`](crate::http::ResponseWriter) variant once per request,
//! so takeover support reaches the application unchanged (except through a
//! compressing writer, see [`gzip`]).

pub mod access_log;
pub mod gzip;
pub mod proxy_redirect;

use std::sync::Arc;

pub use access_log::{access_log, AccessLog, AccessLogWriter, LogRecord, StatusRecorder, TracingLog};
pub use gzip::{gzip, Gzip};
pub use proxy_redirect::{proxy_redirect, single_joining_slash, ProxyRedirect};

use crate::config::ServerConfig;
use crate::http::Handler;

/// Wrap `app` in the decorators enabled by `config`.
///
/// The access log sits closest to the application so it records the
/// handler's own status and uncompressed byte count.
pub fn stack<H: Handler>(
    config: &ServerConfig,
    app: H,
    log_writer: Option<Arc<dyn AccessLogWriter>>,
) -> Arc<dyn Handler> {
    let mut handler: Arc<dyn Handler> = Arc::new(app);

    if let Some(writer) = log_writer {
        handler = Arc::new(access_log(writer, handler));
    }
    if let Some(base_path) = &config.proxy_redirect.base_path {
        handler = Arc::new(proxy_redirect(base_path.clone(), handler));
    }
    if config.compression.enabled {
        handler = Arc::new(gzip(handler));
    }
    handler
}
