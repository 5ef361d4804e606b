//! Recording proxy core.
//!
//! # Data Flow
//! ```text
//! engine.rs (accept loop, lifecycle)
//!     → net::read_request
//!     → handler.rs (verb dispatch, cache, fetch, store)
//!     → response written, connection closed
//! ```

pub mod engine;
pub mod handler;

pub use engine::{EngineError, ProxyEngine};
pub use handler::RequestHandler;
