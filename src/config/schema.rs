//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every section falls back to its defaults so a minimal file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Access log settings.
    pub access_log: AccessLogConfig,

    /// Response compression settings.
    pub compression: CompressionConfig,

    /// Redirect rewriting for a reverse-proxy mount path.
    pub proxy_redirect: ProxyRedirectConfig,

    /// The application being served.
    pub app: AppConfig,

    /// Diagnostic logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body buffered for a handler, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Log one line per request.
    pub enabled: bool,

    /// Log file path. Without one, lines go to the diagnostic log.
    pub path: Option<PathBuf>,

    /// Permission bits for a newly created log file.
    pub mode: u32,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            mode: 0o644,
        }
    }
}

/// Compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Gzip responses for clients that accept it.
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Redirect rewrite configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyRedirectConfig {
    /// Path the application is mounted at behind the proxy (e.g., "/app").
    pub base_path: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory served by the file server.
    pub root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `tracing` filter directive; `RUST_LOG` overrides it.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "respwrap=info,tower_http=info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.listener.max_body_bytes, 1024 * 1024);
        assert_eq!(config.timeouts.request_secs, 30);
        assert!(config.access_log.enabled);
        assert_eq!(config.access_log.mode, 0o644);
        assert!(config.compression.enabled);
        assert!(config.proxy_redirect.base_path.is_none());
        assert_eq!(config.app.root, PathBuf::from("."));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [access_log]
            path = "/tmp/access.log"
            mode = 0o600

            [proxy_redirect]
            base_path = "/app"
            "#,
        )
        .unwrap();

        assert!(config.access_log.enabled);
        assert_eq!(config.access_log.path, Some(PathBuf::from("/tmp/access.log")));
        assert_eq!(config.access_log.mode, 0o600);
        assert_eq!(config.proxy_redirect.base_path.as_deref(), Some("/app"));
        assert!(config.compression.enabled);
    }
}
