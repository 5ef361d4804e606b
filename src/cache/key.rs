//! Cache key derivation.
//!
//! A key is the lower-case hex SHA-256 of the method, the effective URL and,
//! for POST, an encoding of the body. Components are separated by a NUL byte
//! so `("GE", "Thttp://…")` cannot collide with `("GET", "http://…")`.

use sha2::{Digest, Sha256};

use crate::config::KeyDerivation;
use crate::http::request::{FormFields, ProxyRequest};

/// Key for a request without a body component.
pub fn cache_key(method: &str, url: &str) -> String {
    digest(&[method.as_bytes(), url.as_bytes()])
}

/// Key for a POST, independent of field order.
pub fn post_cache_key(method: &str, url: &str, fields: &FormFields) -> String {
    digest(&[method.as_bytes(), url.as_bytes(), fields.canonical().as_bytes()])
}

/// Key for a POST over the raw body bytes; field order matters.
pub fn raw_body_cache_key(method: &str, url: &str, body: &[u8]) -> String {
    digest(&[method.as_bytes(), url.as_bytes(), body])
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(*part);
    }
    format!("{:x}", hasher.finalize())
}

/// Derives keys for parsed requests according to the configured strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyer {
    derivation: KeyDerivation,
}

impl CacheKeyer {
    pub fn new(derivation: KeyDerivation) -> Self {
        Self { derivation }
    }

    /// Key for `request`, using its effective (possibly overridden) URL.
    pub fn key_for(&self, request: &ProxyRequest, fields: &FormFields) -> String {
        let url = request.effective_url();
        if !request.is_post() {
            return cache_key(&request.method, url);
        }
        match self.derivation {
            KeyDerivation::Canonical => post_cache_key(&request.method, url, fields),
            KeyDerivation::RawBody => raw_body_cache_key(&request.method, url, &request.body),
        }
    }
}
