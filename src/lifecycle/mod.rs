//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Open cache → Build fetcher → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     SHUTDOWN verb → flag → loop exits at next iteration → close listener
//!     SIGINT/SIGTERM (signals.rs) → flag + wake → close listener now
//!
//! States:
//!     Initializing → Listening → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, nothing after the loop starts is
//! - In-flight requests finish before the listener is dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::{LifecycleState, Shutdown};
pub use signals::spawn_signal_listener;
