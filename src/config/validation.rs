//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, concurrency > 0)
//! - Check addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeServerConfig → Result<(), Vec<ValidationError>>
//! - Filesystem checks (does the interpreter root exist?) happen at startup, not here

use std::net::SocketAddr;

use crate::config::schema::BridgeServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration for values that would break the server at runtime.
pub fn validate_config(config: &BridgeServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let bridge = &config.bridge;
    if bridge.interpreter.trim().is_empty() {
        errors.push(ValidationError::new("bridge.interpreter", "must not be empty"));
    }
    if bridge.entry_point.trim().is_empty() {
        errors.push(ValidationError::new("bridge.entry_point", "must not be empty"));
    }
    if !bridge.api_prefix.starts_with('/') || bridge.api_prefix.len() < 2 {
        errors.push(ValidationError::new(
            "bridge.api_prefix",
            format!("'{}' must start with '/' and name a segment", bridge.api_prefix),
        ));
    } else if bridge.api_prefix.ends_with('/') || bridge.api_prefix.contains('{') {
        errors.push(ValidationError::new(
            "bridge.api_prefix",
            "must not end with '/' or contain route parameters",
        ));
    }
    if bridge.script_timeout_secs == 0 {
        errors.push(ValidationError::new("bridge.script_timeout_secs", "must be greater than 0"));
    }
    if bridge.max_concurrent_scripts == 0 {
        errors.push(ValidationError::new("bridge.max_concurrent_scripts", "must be greater than 0"));
    }
    if bridge.max_output_bytes == 0 {
        errors.push(ValidationError::new("bridge.max_output_bytes", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    } else if config.timeouts.request_secs < bridge.script_timeout_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must not be shorter than bridge.script_timeout_secs",
        ));
    }

    if config.static_files.root.is_some() && config.static_files.index.trim().is_empty() {
        errors.push(ValidationError::new("static_files.index", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
