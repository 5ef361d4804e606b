//! Response handling and transformation.
//!
//! # Responsibilities
//! - Split a raw origin response into header lines and body
//! - Strip headers that break the whole-buffer write model
//! - Reassemble responses for the client
//! - Inject the cache-status header in debug mode
//!
//! # Design Decisions
//! - Responses are byte buffers end to end; bodies are never decoded
//! - `Transfer-Encoding` is always removed: bodies are written whole
//! - Failure responses are complete messages with an empty body

/// Debug header reporting whether a response came from the cache.
pub const RESPONSE_STATUS_HEADER: &str = "X-Proximate-Response-Status";

/// Fixed answer for refused tunnels and generic failures.
pub const SERVER_ERROR: &[u8] = b"HTTP/1.1 500 Server error\r\n\r\n";

/// Answer when the origin fetch exceeded its deadline.
pub const REQUEST_TIMEOUT: &[u8] = b"HTTP/1.1 408 Request Timeout\r\n\r\n";

/// Acknowledgement for the in-band stop verb.
pub const SHUTDOWN_ACK: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

const CRLF: &[u8] = b"\r\n";

/// Headers never re-emitted to clients.
const STRIPPED_HEADERS: &[&str] = &["transfer-encoding"];

/// Where a response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Live,
}

impl ServedFrom {
    pub fn header_value(self) -> &'static str {
        match self {
            ServedFrom::Cache => "From-Cache",
            ServedFrom::Live => "From-Live",
        }
    }

    pub fn from_header_value(value: &str) -> Option<Self> {
        match value.trim() {
            "From-Cache" => Some(ServedFrom::Cache),
            "From-Live" => Some(ServedFrom::Live),
            _ => None,
        }
    }
}

/// Split on the first `CRLF CRLF` into header lines and body.
///
/// The first "header line" is the status line.
pub fn split_headers_body(raw: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let (head, body) = match raw.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => (&raw[..pos], &raw[pos + 4..]),
        None => (raw, &raw[raw.len()..]),
    };

    let mut lines = Vec::new();
    let mut rest = head;
    while let Some(pos) = rest.windows(2).position(|w| w == CRLF) {
        lines.push(&rest[..pos]);
        rest = &rest[pos + 2..];
    }
    if !rest.is_empty() {
        lines.push(rest);
    }
    (lines, body)
}

/// Drop header lines whose name is in the stripped set.
pub fn filter_headers(lines: Vec<&[u8]>) -> Vec<&[u8]> {
    lines
        .into_iter()
        .filter(|line| !is_stripped(line))
        .collect()
}

fn is_stripped(line: &[u8]) -> bool {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return false;
    };
    let name = String::from_utf8_lossy(&line[..colon]);
    let name = name.trim();
    STRIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Join header lines (each CRLF-terminated), a blank line, then the body.
pub fn assemble(lines: &[&[u8]], body: &[u8]) -> Vec<u8> {
    let head_len: usize = lines.iter().map(|l| l.len() + 2).sum();
    let mut out = Vec::with_capacity(head_len + 2 + body.len());
    for line in lines {
        out.extend_from_slice(line);
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
    out
}

/// Split, filter and reassemble an origin response.
pub fn filter_response(raw: &[u8]) -> Vec<u8> {
    let (lines, body) = split_headers_body(raw);
    assemble(&filter_headers(lines), body)
}

/// Append one header line just before the body separator.
pub fn inject_header(raw: &[u8], name: &str, value: &str) -> Vec<u8> {
    let (mut lines, body) = split_headers_body(raw);
    let extra = format!("{}: {}", name, value);
    lines.push(extra.as_bytes());
    assemble(&lines, body)
}
