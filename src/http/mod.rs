//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! raw request buffer
//!     → verb.rs (CONNECT / SHUTDOWN / plain fetch)
//!     → request.rs (request line, headers, body, form fields, real URL)
//!     → [cache lookup or origin fetch]
//!     → response.rs (split, filter, reassemble, debug header)
//!     → written to the client socket
//! ```

pub mod request;
pub mod response;
pub mod verb;

pub use request::{FormFields, ProxyRequest, RequestError, DEFAULT_REAL_URL_HEADER};
pub use response::{ServedFrom, RESPONSE_STATUS_HEADER};
pub use verb::Verb;
