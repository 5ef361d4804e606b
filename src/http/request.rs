//! Proxy request parsing.
//!
//! # Responsibilities
//! - Split the request line into method, absolute target URL and version
//! - Separate header lines from the body on the first blank line
//! - Decode URL-encoded POST fields
//! - Detect the real-URL override header used for HTTPS bypass
//!
//! # Design Decisions
//! - Parsing works on the bounded raw buffer as read from the socket;
//!   nothing is re-read from the client
//! - Header names are matched case-insensitively
//! - An override that is not an absolute http(s) URL is ignored

use url::form_urlencoded;
use url::Url;

/// Default name of the header carrying the original HTTPS URL.
pub const DEFAULT_REAL_URL_HEADER: &str = "X-Real-Url";

/// Error raised when a request buffer has no usable request line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request line: {0:?}")]
    Malformed(String),
}

/// A request as received by the proxy, parsed from one read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub method: String,
    pub target_url: String,
    pub version: String,
    /// Raw header lines, in order, without the request line.
    pub headers: Vec<String>,
    pub body: Vec<u8>,
    pub real_url_override: Option<String>,
}

impl ProxyRequest {
    /// Parse a raw proxy request.
    ///
    /// `real_url_header` names the header that, when present and well-formed,
    /// replaces the target URL for everything downstream.
    pub fn parse(raw: &[u8], real_url_header: &str) -> Result<Self, RequestError> {
        let (method, target_url, version) = parse_request_line(raw)?;
        let (head, body) = split_head_body(raw);

        let head = String::from_utf8_lossy(head);
        let headers: Vec<String> = head
            .split("\r\n")
            .skip(1)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let real_url_override = find_header(&headers, real_url_header).and_then(|value| {
            let candidate = value.split_whitespace().next()?;
            if is_absolute_http_url(candidate) {
                Some(candidate.to_string())
            } else {
                tracing::warn!(
                    header = real_url_header,
                    value = candidate,
                    "Ignoring real URL header that is not an absolute http(s) URL"
                );
                None
            }
        });

        Ok(Self {
            method,
            target_url,
            version,
            headers,
            body: body.to_vec(),
            real_url_override,
        })
    }

    /// The URL to fetch and key on: the override when present, else the target.
    pub fn effective_url(&self) -> &str {
        self.real_url_override.as_deref().unwrap_or(&self.target_url)
    }

    /// First header value with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Methods are case-sensitive; only an exact `POST` carries form fields.
    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }

    /// URL-encoded fields from the body.
    pub fn form_fields(&self) -> FormFields {
        FormFields::parse(&self.body)
    }
}

/// Split the first line of `raw` into method, target and protocol version.
///
/// Anything after the version token is ignored.
pub fn parse_request_line(raw: &[u8]) -> Result<(String, String, String), RequestError> {
    let end = raw
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(raw.len());
    let line = String::from_utf8_lossy(&raw[..end]);
    let mut tokens = line.split_whitespace();

    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(target), Some(version)) => {
            Ok((method.to_string(), target.to_string(), version.to_string()))
        }
        _ => Err(RequestError::Malformed(line.trim_end().chars().take(80).collect())),
    }
}

/// Split a message on the first `CRLF CRLF`; without one, the body is empty.
pub fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    match raw.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => (&raw[..pos], &raw[pos + 4..]),
        None => (raw, &raw[raw.len()..]),
    }
}

fn find_header<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    headers.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim())
        } else {
            None
        }
    })
}

fn is_absolute_http_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Decoded URL-encoded form fields.
///
/// Insertion order is kept for the outbound body; a repeated name overwrites
/// the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `&`-separated `name=value` pairs.
    ///
    /// Chunks without exactly one `=` are skipped.
    pub fn parse(body: &[u8]) -> Self {
        let mut fields = Self::new();
        for chunk in body.split(|&b| b == b'&') {
            if chunk.iter().filter(|&&b| b == b'=').count() != 1 {
                continue;
            }
            if let Some((name, value)) = form_urlencoded::parse(chunk).next() {
                fields.insert(name.into_owned(), value.into_owned());
            }
        }
        fields
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable encoding: fields sorted by name, form-urlencoded.
    pub fn canonical(&self) -> String {
        let mut sorted: Vec<_> = self.iter().collect();
        sorted.sort_unstable();
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish()
    }

    /// Encoding in insertion order, used as the outbound POST body.
    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}
