//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, body limit > 0, file mode bits)
//! - Check the shape of addresses and paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("access_log.path must not be empty")]
    EmptyLogPath,

    #[error("access_log.mode {0:o} has bits outside 0o7777")]
    InvalidLogMode(u32),

    #[error("proxy_redirect.base_path {0:?} must start with '/'")]
    RelativeBasePath(String),
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if let Some(path) = &config.access_log.path {
        if path.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyLogPath);
        }
    }
    if config.access_log.mode > 0o7777 {
        errors.push(ValidationError::InvalidLogMode(config.access_log.mode));
    }

    if let Some(base) = &config.proxy_redirect.base_path {
        if !base.starts_with('/') {
            errors.push(ValidationError::RelativeBasePath(base.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "localhost".into();
        config.listener.max_body_bytes = 0;
        config.timeouts.request_secs = 0;
        config.access_log.path = Some(PathBuf::new());
        config.access_log.mode = 0o10000;
        config.proxy_redirect.base_path = Some("app".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidBindAddress("localhost".into()),
                ValidationError::ZeroBodyLimit,
                ValidationError::ZeroRequestTimeout,
                ValidationError::EmptyLogPath,
                ValidationError::InvalidLogMode(0o10000),
                ValidationError::RelativeBasePath("app".into()),
            ]
        );
    }

    #[test]
    fn messages_name_the_field() {
        let err = ValidationError::InvalidLogMode(0o17777);
        assert_eq!(err.to_string(), "access_log.mode 17777 has bits outside 0o7777");
        assert!(ValidationError::RelativeBasePath("app".into())
            .to_string()
            .starts_with("proxy_redirect.base_path"));
    }
}
