//! Persisted cache entries.
//!
//! On-disk layout is one compact JSON metadata line, a `\n`, then the filtered
//! response bytes verbatim. Recorded fixtures stay readable with a pager and
//! binary bodies are stored without re-encoding.

use serde::{Deserialize, Serialize};

use crate::cache::CacheError;

/// A recorded response and the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub method: String,
    pub key: String,
    /// Filtered header block plus body.
    pub response: Vec<u8>,
}

/// Metadata written ahead of the response bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub url: String,
    pub method: String,
    pub key: String,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>, method: impl Into<String>, key: impl Into<String>, response: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            key: key.into(),
            response,
        }
    }

    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            url: self.url.clone(),
            method: self.method.clone(),
            key: self.key.clone(),
        }
    }

    /// Serialize to the stored blob format.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let mut blob = serde_json::to_vec(&self.meta())?;
        blob.push(b'\n');
        blob.extend_from_slice(&self.response);
        Ok(blob)
    }

    /// Parse a stored blob.
    pub fn decode(blob: &[u8]) -> Result<Self, CacheError> {
        let newline = blob
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| CacheError::Corrupt("missing metadata line".into()))?;
        let meta: EntryMeta = serde_json::from_slice(&blob[..newline])
            .map_err(|e| CacheError::Corrupt(format!("bad metadata: {}", e)))?;

        Ok(Self {
            url: meta.url,
            method: meta.method,
            key: meta.key,
            response: blob[newline + 1..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_response_survives_encoding() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\n\x89PNG\n\x00\xff".to_vec();
        let entry = CacheEntry::new("http://x/a.png", "GET", "abc", response.clone());

        let blob = entry.encode().unwrap();
        assert!(blob.starts_with(b"{\"url\":\"http://x/a.png\""));

        let decoded = CacheEntry::decode(&blob).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.response, response);
    }

    #[test]
    fn metadata_with_newlines_is_escaped() {
        let entry = CacheEntry::new("http://x/?q=a\nb", "GET", "k", b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded.url, "http://x/?q=a\nb");
    }

    #[test]
    fn rejects_blob_without_metadata() {
        assert!(matches!(CacheEntry::decode(b"HTTP/1.1 200 OK"), Err(CacheError::Corrupt(_))));
        assert!(matches!(CacheEntry::decode(b"not json\nbody"), Err(CacheError::Corrupt(_))));
    }
}
