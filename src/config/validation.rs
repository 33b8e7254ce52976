//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Resolve every target list so malformed targets fail at startup
//! - Validate value ranges (status code, ports, local paths)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::{HeaderName, HeaderValue, StatusCode};

use crate::config::schema::{ListenerKind, ProxyConfig};
use crate::targets::{resolve, TargetDefaults, TargetError};

/// A semantic problem in an otherwise well-formed config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{listener} targets: {error}")]
    Target { listener: ListenerKind, error: TargetError },

    #[error("response_status_code {0} is not a valid HTTP status")]
    InvalidStatusCode(u16),

    #[error("invalid response header {0:?}")]
    InvalidResponseHeader(String),

    #[error("local path {0:?} must start with '/'")]
    InvalidLocalPath(String),

    #[error("http_port and https_port are both {0}")]
    PortConflict(u16),
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let defaults = TargetDefaults::from_config(config);

    for listener in [ListenerKind::Http, ListenerKind::Https] {
        if listener == ListenerKind::Https && !config.listener.https_enabled {
            continue;
        }
        if let Err(error) = resolve(config.targets_for(listener), &defaults) {
            errors.push(ValidationError::Target { listener, error });
        }
    }

    if !(100..=999).contains(&config.response_status_code)
        || StatusCode::from_u16(config.response_status_code).is_err()
    {
        errors.push(ValidationError::InvalidStatusCode(config.response_status_code));
    }

    for (name, value) in &config.response_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidResponseHeader(name.clone()));
        }
    }

    for path in &config.local_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidLocalPath(path.clone()));
        }
    }

    let listener = &config.listener;
    if listener.https_enabled && listener.http_port != 0 && listener.http_port == listener.https_port {
        errors.push(ValidationError::PortConflict(listener.http_port));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
