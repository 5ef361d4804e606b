//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use replay_proxy::http::ProxyRequest;
use replay_proxy::lifecycle::Shutdown;
use replay_proxy::net::read_request;
use replay_proxy::{EngineError, ProxyConfig, ProxyEngine};

/// A request as seen by a mock origin.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub target: String,
    pub headers: Vec<String>,
    pub body: Vec<u8>,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.iter().find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
        })
    }
}

/// A raw-TCP origin server recording what it receives.
pub struct MockOrigin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl MockOrigin {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

/// Start an origin that answers every request with `respond(request)`,
/// after an optional delay.
pub async fn start_origin<F>(delay: Duration, respond: F) -> MockOrigin
where
    F: Fn(&Seen) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    {
        let hits = hits.clone();
        let seen = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hits = hits.clone();
                let seen = seen.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    let raw = read_request(&mut socket, 64 * 1024, Duration::from_secs(5)).await.unwrap_or_default();
                    let Ok(request) = ProxyRequest::parse(&raw, "X-Real-Url") else {
                        return;
                    };
                    hits.fetch_add(1, Ordering::SeqCst);
                    let request = Seen {
                        method: request.method,
                        target: request.target_url,
                        headers: request.headers,
                        body: request.body,
                    };
                    seen.lock().unwrap().push(request.clone());

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let _ = socket.write_all(&respond(&request)).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
    }

    MockOrigin { addr, hits, seen }
}

/// `200 OK` with a Content-Length body.
pub fn ok_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// `200 OK` with a single-chunk chunked body.
pub fn chunked_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{:x}\r\n{}\r\n0\r\n\r\n",
        body.len(),
        body
    )
    .into_bytes()
}

pub async fn start_fixed_origin(body: &'static str) -> MockOrigin {
    start_origin(Duration::ZERO, move |_| ok_response(body)).await
}

/// Echo the method and body back, so distinct requests get distinct pages.
pub async fn start_echo_origin() -> MockOrigin {
    start_origin(Duration::ZERO, |seen| {
        ok_response(&format!("{} {}", seen.method, String::from_utf8_lossy(&seen.body)))
    })
    .await
}

/// A proxy engine running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub cache_root: PathBuf,
    task: Option<JoinHandle<Result<(), EngineError>>>,
}

impl TestProxy {
    /// Wait for the engine task to finish.
    pub async fn join(mut self) -> Result<(), EngineError> {
        let task = self.task.take().expect("engine already joined");
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("engine did not stop")
            .expect("engine task panicked")
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.interrupt();
        let _ = std::fs::remove_dir_all(&self.cache_root);
    }
}

pub fn temp_cache_root() -> PathBuf {
    std::env::temp_dir().join(format!("replay-proxy-test-{}", uuid::Uuid::new_v4()))
}

/// Start a debug-mode proxy with a file cache in a fresh temp directory.
pub async fn start_proxy(configure: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let cache_root = temp_cache_root();
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.engine.debug_headers = true;
    config.engine.handle_signals = false;
    config.cache.root = cache_root.to_string_lossy().into_owned();
    configure(&mut config);

    let engine = ProxyEngine::from_config(&config).await.unwrap();
    let addr = engine.local_addr().unwrap();
    let shutdown = engine.shutdown_handle();
    let task = tokio::spawn(engine.run());

    TestProxy { addr, shutdown, cache_root, task: Some(task) }
}

/// Send raw bytes to `addr` and read the response to EOF.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    use tokio::io::AsyncReadExt;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}
