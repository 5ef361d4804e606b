//! Verb dispatch for raw proxy requests.
//!
//! Requests are classified in a fixed priority order:
//! 1. `CONNECT host:port` → HTTPS tunnel (refused)
//! 2. `SHUTDOWN` → in-band control verb
//! 3. any other well-formed request line → fetched through the cache

use crate::http::request::{ProxyRequest, RequestError};

/// What the engine should do with one request buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// HTTPS tunnel request; never attempted.
    Connect { authority: String },
    /// Stop accepting connections once this one is answered.
    Shutdown,
    /// Plain proxy fetch (GET, POST or another method).
    Http(ProxyRequest),
    /// No parseable request line.
    Malformed(RequestError),
}

impl Verb {
    pub fn parse(raw: &[u8], real_url_header: &str) -> Self {
        let line = first_line(raw);
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("CONNECT") => {
                let authority = tokens.next().unwrap_or("").to_string();
                return Verb::Connect { authority };
            }
            Some("SHUTDOWN") => return Verb::Shutdown,
            _ => {}
        }

        match ProxyRequest::parse(raw, real_url_header) {
            Ok(request) => Verb::Http(request),
            Err(e) => Verb::Malformed(e),
        }
    }

    /// Short label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Connect { .. } => "connect",
            Verb::Shutdown => "shutdown",
            Verb::Http(_) => "http",
            Verb::Malformed(_) => "malformed",
        }
    }
}

fn first_line(raw: &[u8]) -> std::borrow::Cow<'_, str> {
    let end = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end])
}
