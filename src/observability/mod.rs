//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! engine, cache, fetcher
//!     → logging.rs (structured `tracing` events: url, method, key, connection)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via the fmt layer
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
