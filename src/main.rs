//! Recording proxy server (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client (HTTP_PROXY)          ┌──────────────────────────────────────────┐
//!     ─────────────────────────────┼─▶ net::Listener ─▶ net::read_request     │
//!                                  │                        │                 │
//!                                  │                        ▼                 │
//!                                  │              proxy::RequestHandler       │
//!                                  │               │               │          │
//!                                  │        cache hit          cache miss     │
//!                                  │               │               ▼          │
//!                                  │               │     upstream::Fetcher ───┼──▶ Origin
//!                                  │               │               │          │
//!                                  │               │      filter + store      │
//!     ◀────────────────────────────┼───────────────┴───────────────┘          │
//!                                  └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use replay_proxy::config::{load_or_default, validate_config, CacheBackend, EngineMode};
use replay_proxy::observability::{logging, metrics};
use replay_proxy::ProxyEngine;

#[derive(Parser)]
#[command(name = "replay-proxy")]
#[command(about = "Recording HTTP proxy: fetch once, replay from cache", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8081
    #[arg(short, long)]
    bind: Option<String>,

    /// Cache root directory
    #[arg(long)]
    cache_dir: Option<String>,

    /// Add X-Proximate-Response-Status to responses
    #[arg(long)]
    debug_headers: bool,

    /// Keep entries in memory only
    #[arg(long)]
    memory_cache: bool,

    /// Serve connections concurrently
    #[arg(long)]
    concurrent: bool,

    /// Do not install SIGINT/SIGTERM handlers
    #[arg(long)]
    no_signals: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(dir) = args.cache_dir {
        config.cache.root = dir;
    }
    if args.debug_headers {
        config.engine.debug_headers = true;
    }
    if args.memory_cache {
        config.cache.backend = CacheBackend::Memory;
    }
    if args.concurrent {
        config.engine.mode = EngineMode::Concurrent;
    }
    if args.no_signals {
        config.engine.handle_signals = false;
    }
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("invalid configuration: {}", e);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("replay-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Metrics exporter not installed");
                }
            }
            Err(e) => tracing::error!(error = %e, "Invalid metrics address"),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        cache_root = %config.cache.root,
        backend = ?config.cache.backend,
        mode = ?config.engine.mode,
        debug_headers = config.engine.debug_headers,
        "Configuration loaded"
    );

    let engine = ProxyEngine::from_config(&config).await?;
    engine.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
