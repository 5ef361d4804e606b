//! Upstream (origin) fetch subsystem.
//!
//! # Data Flow
//! ```text
//! cache miss
//!     → Fetcher::fetch(url, method, form fields)
//!     → one outbound request, redirects not followed, bounded by a timeout
//!     → raw response bytes (status line + headers + CRLF CRLF + body)
//! ```
//!
//! # Design Decisions
//! - No retries: a failed fetch is answered immediately
//! - Timeouts are distinct from other failures (408 vs 500 for the client)
//! - The response is accumulated locally and returned; nothing is shared

pub mod fetcher;

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::http::request::FormFields;
use crate::http::response::{REQUEST_TIMEOUT, SERVER_ERROR};

pub use fetcher::HttpFetcher;

/// What to fetch from the origin.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub method: &'a str,
    /// Sent as a URL-encoded body for POST; ignored otherwise.
    pub fields: &'a FormFields,
}

/// Error type for origin fetches.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch failed: {0}")]
    Transport(String),

    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("invalid method `{0}`")]
    InvalidMethod(String),
}

impl FetchError {
    /// Label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::InvalidMethod(_) => "invalid_method",
        }
    }

    /// The response written to the client for this failure.
    pub fn client_response(&self) -> &'static [u8] {
        match self {
            FetchError::Timeout(_) => REQUEST_TIMEOUT,
            _ => SERVER_ERROR,
        }
    }
}

/// Performs the outbound request for a cache miss.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<Vec<u8>, FetchError>>;
}
