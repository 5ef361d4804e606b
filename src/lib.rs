//! Recording HTTP forward proxy.
//!
//! Every GET/POST passing through is fetched once from the origin, stored on
//! disk, and replayed from the cache afterwards.

pub mod cache;
pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod upstream;

pub use client::{ClientError, ClientResponse, ProxyClient};
pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{EngineError, ProxyEngine};
