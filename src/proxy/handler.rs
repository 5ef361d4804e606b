//! Per-request handling: verb dispatch, cache lookup, origin fetch, storage.
//!
//! # Data Flow
//! ```text
//! raw buffer → Verb
//!     CONNECT   → 500, never tunnelled
//!     SHUTDOWN  → stop flag, 200
//!     malformed → 500
//!     fetch     → key → hit? cached bytes
//!                     → miss: key lock → re-check → fetch → filter → store
//! ```
//!
//! # Design Decisions
//! - Cache failures degrade to a miss (read) or an unstored response (write)
//! - Fetch failures are answered and never stored

use std::sync::Arc;

use crate::cache::{CacheEntry, CacheKeyer, CacheStore, KeyLocks};
use crate::config::ProxyConfig;
use crate::http::request::ProxyRequest;
use crate::http::response::{
    filter_response, inject_header, ServedFrom, RESPONSE_STATUS_HEADER, SERVER_ERROR, SHUTDOWN_ACK,
};
use crate::http::verb::Verb;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::upstream::{FetchRequest, Fetcher};

/// Turns one raw request buffer into one raw response buffer.
pub struct RequestHandler {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    keyer: CacheKeyer,
    locks: KeyLocks,
    debug_headers: bool,
    real_url_header: String,
    shutdown: Shutdown,
}

struct Outcome {
    response: Vec<u8>,
    served_from: ServedFrom,
    label: &'static str,
}

impl Outcome {
    fn live(response: Vec<u8>, label: &'static str) -> Self {
        Self { response, served_from: ServedFrom::Live, label }
    }
}

impl RequestHandler {
    pub fn new(
        config: &ProxyConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            fetcher,
            keyer: CacheKeyer::new(config.cache.key_derivation),
            locks: KeyLocks::new(),
            debug_headers: config.engine.debug_headers,
            real_url_header: config.engine.real_url_header.clone(),
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Produce the complete response for `raw`. Never fails.
    pub async fn handle(&self, raw: &[u8]) -> Vec<u8> {
        let verb = Verb::parse(raw, &self.real_url_header);
        let verb_name = verb.name();

        let outcome = match verb {
            Verb::Connect { authority } => {
                tracing::warn!(authority = %authority, "Refusing CONNECT tunnel");
                Outcome::live(SERVER_ERROR.to_vec(), "refused")
            }
            Verb::Shutdown => {
                self.shutdown.request_stop();
                Outcome::live(SHUTDOWN_ACK.to_vec(), "stop")
            }
            Verb::Malformed(e) => {
                tracing::warn!(error = %e, bytes = raw.len(), "Unparseable request");
                Outcome::live(SERVER_ERROR.to_vec(), "malformed")
            }
            Verb::Http(request) => self.handle_http(&request).await,
        };

        metrics::record_request(verb_name, outcome.label);
        self.finish(outcome.response, outcome.served_from)
    }

    async fn handle_http(&self, request: &ProxyRequest) -> Outcome {
        let fields = request.form_fields();
        let key = self.keyer.key_for(request, &fields);
        let url = request.effective_url();

        if let Some(hit) = self.lookup(&key) {
            return self.hit(url, hit);
        }

        // Concurrent misses on one key wait here; the winner's entry is then a hit.
        let _guard = self.locks.lock(&key).await;
        if let Some(hit) = self.lookup(&key) {
            return self.hit(url, hit);
        }

        metrics::record_cache_miss();
        tracing::info!(method = %request.method, url = %url, key = %key, "Cache miss, fetching");

        let fetched = self
            .fetcher
            .fetch(FetchRequest { url, method: &request.method, fields: &fields })
            .await;

        match fetched {
            Ok(raw) => {
                let response = filter_response(&raw);
                self.save(CacheEntry::new(url, request.method.as_str(), key.as_str(), response.clone()));
                Outcome::live(response, "miss")
            }
            Err(e) => {
                metrics::record_fetch_failure(e.kind());
                tracing::warn!(url = %url, error = %e, "Answering failed fetch");
                Outcome::live(e.client_response().to_vec(), "fetch_error")
            }
        }
    }

    fn hit(&self, url: &str, entry: CacheEntry) -> Outcome {
        metrics::record_cache_hit();
        tracing::info!(url = %url, key = %entry.key, "Cache hit");
        Outcome { response: entry.response, served_from: ServedFrom::Cache, label: "hit" }
    }

    fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let found = self.store.exists(key).and_then(|exists| {
            if !exists {
                return Ok(None);
            }
            let blob = self.store.get(key)?;
            CacheEntry::decode(&blob).map(Some)
        });

        match found {
            Ok(entry) => entry,
            Err(e) => {
                metrics::record_cache_error("read");
                tracing::error!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    fn save(&self, entry: CacheEntry) {
        let stored = entry.encode().and_then(|blob| self.store.put(&entry.key, &blob));
        if let Err(e) = stored {
            metrics::record_cache_error("write");
            tracing::error!(key = %entry.key, error = %e, "Cache write failed, response not recorded");
            return;
        }

        match self.store.count() {
            Ok(n) => {
                metrics::record_cache_size(n);
                tracing::info!(entries = n, "Cache now contains {} items", n);
            }
            Err(e) => {
                metrics::record_cache_error("count");
                tracing::debug!(error = %e, "Cache count failed");
            }
        }
    }

    fn finish(&self, response: Vec<u8>, served_from: ServedFrom) -> Vec<u8> {
        if self.debug_headers {
            inject_header(&response, RESPONSE_STATUS_HEADER, served_from.header_value())
        } else {
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;

    use crate::cache::{CacheError, MemoryStore};
    use crate::upstream::FetchError;

    const PAGE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\n\r\n<html>hi</html>";

    #[derive(Clone)]
    enum Reply {
        Page(&'static [u8]),
        Timeout,
        Refused,
    }

    struct RecordingFetcher {
        reply: Reply,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingFetcher {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self { reply, calls: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Fetcher for RecordingFetcher {
        fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
            self.calls.lock().unwrap().push((
                request.method.to_string(),
                request.url.to_string(),
                request.fields.encode(),
            ));
            let reply = match self.reply {
                Reply::Page(bytes) => Ok(bytes.to_vec()),
                Reply::Timeout => Err(FetchError::Timeout(Duration::from_secs(15))),
                Reply::Refused => Err(FetchError::Transport("connection refused".into())),
            };
            async move { reply }.boxed()
        }
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }
        fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
            Err(CacheError::NotFound(key.to_string()))
        }
        fn put(&self, _key: &str, _blob: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }
        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
        fn list_keys(&self) -> Result<Vec<String>, CacheError> {
            Ok(Vec::new())
        }
    }

    fn handler(fetcher: Arc<RecordingFetcher>, debug: bool) -> (RequestHandler, Arc<MemoryStore>, Shutdown) {
        let mut config = ProxyConfig::default();
        config.engine.debug_headers = debug;
        let store = Arc::new(MemoryStore::new());
        let shutdown = Shutdown::new();
        let handler = RequestHandler::new(&config, store.clone(), fetcher, shutdown.clone());
        (handler, store, shutdown)
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, store, _) = handler(fetcher.clone(), true);
        let raw = b"GET http://example.com/a.html HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let first = text(handler.handle(raw).await);
        assert!(first.contains("X-Proximate-Response-Status: From-Live"));
        assert!(first.ends_with("<html>hi</html>"));
        assert_eq!(store.count().unwrap(), 1);

        let second = text(handler.handle(raw).await);
        assert!(second.contains("X-Proximate-Response-Status: From-Cache"));
        assert!(second.ends_with("<html>hi</html>"));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn stored_response_has_no_transfer_encoding() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, store, _) = handler(fetcher, false);
        let response = text(handler.handle(b"GET http://example.com/ HTTP/1.1\r\n\r\n").await);
        assert!(!response.to_ascii_lowercase().contains("transfer-encoding"));
        assert!(!response.contains(RESPONSE_STATUS_HEADER));

        let key = store.list_keys().unwrap().remove(0);
        let entry = CacheEntry::decode(&store.get(&key).unwrap()).unwrap();
        assert_eq!(entry.url, "http://example.com/");
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.response, response.into_bytes());
    }

    #[tokio::test]
    async fn real_url_override_is_fetched_and_keyed() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, store, _) = handler(fetcher.clone(), false);
        handler
            .handle(b"GET http://example.com/x HTTP/1.1\r\nX-Real-Url: https://example.com/x\r\n\r\n")
            .await;

        assert_eq!(fetcher.calls()[0].1, "https://example.com/x");
        let key = crate::cache::cache_key("GET", "https://example.com/x");
        assert!(store.exists(&key).unwrap());
    }

    #[tokio::test]
    async fn post_fields_are_forwarded_and_keyed_order_free() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, _, _) = handler(fetcher.clone(), true);

        handler.handle(b"POST http://example.com/form HTTP/1.1\r\n\r\na=1&b=hello+world").await;
        let again = text(handler.handle(b"POST http://example.com/form HTTP/1.1\r\n\r\nb=hello%20world&a=1").await);

        assert!(again.contains("From-Cache"));
        let calls = fetcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "POST");
        assert_eq!(calls[0].2, "a=1&b=hello+world");
    }

    #[tokio::test]
    async fn timeout_answers_408_and_is_not_cached() {
        let fetcher = RecordingFetcher::new(Reply::Timeout);
        let (handler, store, _) = handler(fetcher.clone(), true);
        let raw = b"GET http://slow.example/ HTTP/1.1\r\n\r\n";

        let response = text(handler.handle(raw).await);
        assert!(response.starts_with("HTTP/1.1 408"));
        assert!(response.contains("From-Live"));
        assert_eq!(store.count().unwrap(), 0);

        handler.handle(raw).await;
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_answers_500() {
        let (handler, store, _) = handler(RecordingFetcher::new(Reply::Refused), false);
        let response = handler.handle(b"GET http://down.example/ HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, SERVER_ERROR);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_is_refused_without_fetching() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, _, _) = handler(fetcher.clone(), false);
        let response = handler.handle(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response, b"HTTP/1.1 500 Server error\r\n\r\n");
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn shutdown_verb_requests_stop() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, _, shutdown) = handler(fetcher.clone(), false);
        let response = handler.handle(b"SHUTDOWN\r\n\r\n").await;
        assert_eq!(response, SHUTDOWN_ACK);
        assert!(shutdown.is_stopping());
        assert!(!shutdown.is_interrupted());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_buffer_is_a_server_error() {
        let (handler, _, _) = handler(RecordingFetcher::new(Reply::Page(PAGE)), false);
        assert_eq!(handler.handle(b"").await, SERVER_ERROR);
    }

    #[tokio::test]
    async fn broken_store_still_serves_live() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let shutdown = Shutdown::new();
        let mut config = ProxyConfig::default();
        config.engine.debug_headers = true;
        let handler = RequestHandler::new(&config, Arc::new(BrokenStore), fetcher.clone(), shutdown);

        let raw = b"GET http://example.com/ HTTP/1.1\r\n\r\n";
        assert!(text(handler.handle(raw).await).contains("From-Live"));
        assert!(text(handler.handle(raw).await).contains("From-Live"));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_fetch_once() {
        let fetcher = RecordingFetcher::new(Reply::Page(PAGE));
        let (handler, _, _) = handler(fetcher.clone(), false);
        let handler = Arc::new(handler);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handler = handler.clone();
                tokio::spawn(async move { handler.handle(b"GET http://example.com/same HTTP/1.1\r\n\r\n").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().ends_with(b"<html>hi</html>"));
        }
        assert_eq!(fetcher.calls().len(), 1);
    }
}
