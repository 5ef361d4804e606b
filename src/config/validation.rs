//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, buffer sizes sane)
//! - Check addresses and header names parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use reqwest::header::HeaderName;

use crate::config::schema::{CacheBackend, ProxyConfig};

/// Smallest read buffer that still fits a request line plus a few headers.
pub const MIN_READ_BUFFER: usize = 64;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {field}: `{value}` is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("listener.read_buffer_size must be at least 64 bytes (got {0})")]
    ReadBufferTooSmall(usize),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("engine.real_url_header `{0}` is not a valid header name")]
    InvalidHeaderName(String),

    #[error("cache.root must not be empty for the filesystem backend")]
    EmptyCacheRoot,
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.read_buffer_size < MIN_READ_BUFFER {
        errors.push(ValidationError::ReadBufferTooSmall(config.listener.read_buffer_size));
    }
    if config.listener.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero("listener.poll_interval_ms"));
    }
    if config.listener.read_timeout_ms == 0 {
        errors.push(ValidationError::Zero("listener.read_timeout_ms"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::Zero("upstream.timeout_secs"));
    }
    if HeaderName::from_bytes(config.engine.real_url_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName(config.engine.real_url_header.clone()));
    }
    if config.cache.backend == CacheBackend::Filesystem && config.cache.root.trim().is_empty() {
        errors.push(ValidationError::EmptyCacheRoot);
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
