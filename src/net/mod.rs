//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (idle-tick accept, connection slots)
//!     → connection.rs (connection id, bounded request read)
//!     → Hand off to the request handler
//!     → response written, socket closed (no keep-alive)
//! ```

pub mod connection;
pub mod listener;

pub use connection::{read_request, ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
