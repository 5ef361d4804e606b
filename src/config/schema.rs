//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the recording proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, read limits).
    pub listener: ListenerConfig,

    /// Request engine behaviour.
    pub engine: EngineConfig,

    /// Outbound fetch settings.
    pub upstream: UpstreamConfig,

    /// Cache backend settings.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,

    /// Upper bound on bytes read from a client for one request.
    /// Anything beyond this is truncated.
    pub read_buffer_size: usize,

    /// How long to wait for a slow client to finish sending its request.
    pub read_timeout_ms: u64,

    /// Idle sleep between readiness checks of the listening socket.
    pub poll_interval_ms: u64,

    /// Maximum in-flight connections (concurrent mode only).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            read_buffer_size: 4096,
            read_timeout_ms: 2000,
            poll_interval_ms: 10,
            max_connections: 64,
        }
    }
}

/// How accepted connections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// One request at a time, in arrival order.
    #[default]
    Sequential,
    /// One task per connection, with at most one origin fetch per cache key.
    Concurrent,
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduling mode.
    pub mode: EngineMode,

    /// Annotate responses with `X-Proximate-Response-Status`.
    pub debug_headers: bool,

    /// Install SIGINT/SIGTERM handlers.
    pub handle_signals: bool,

    /// Request header carrying the original (HTTPS) URL.
    pub real_url_header: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Sequential,
            debug_headers: false,
            handle_signals: true,
            real_url_header: "X-Real-Url".to_string(),
        }
    }
}

/// Upstream fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Total fetch timeout in seconds.
    pub timeout_secs: u64,

    /// Optional User-Agent sent to origin servers.
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: None,
        }
    }
}

/// Storage backend for recorded responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// One file per entry below `root`.
    #[default]
    Filesystem,
    /// Process-local map; lost on exit.
    Memory,
}

/// How POST bodies contribute to the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyDerivation {
    /// Decoded fields, sorted by name, so field order does not matter.
    #[default]
    Canonical,
    /// The raw request body as received; field order matters.
    RawBody,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Root directory for the filesystem backend.
    pub root: String,

    pub key_derivation: KeyDerivation,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Filesystem,
            root: "./cache".to_string(),
            key_derivation: KeyDerivation::Canonical,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
