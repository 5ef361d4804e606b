//! Origin fetches over `reqwest`.

use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{redirect, Client, Method, Response};
use url::Url;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::upstream::{FetchError, FetchRequest, Fetcher};

/// Fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            // Never route origin fetches through HTTP_PROXY, which may be us.
            .no_proxy();
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_raw(&self, request: FetchRequest<'_>) -> Result<Vec<u8>, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.to_string()))?;
        let url = Url::parse(request.url).map_err(|_| FetchError::InvalidUrl(request.url.to_string()))?;

        let mut outbound = self.client.request(method.clone(), url);
        if method == Method::POST {
            outbound = outbound
                .header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
                .body(request.fields.encode());
        }

        let response = outbound.send().await.map_err(|e| self.classify(e))?;
        let mut raw = render_head(&response);
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        raw.extend_from_slice(&body);
        Ok(raw)
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, request: FetchRequest<'a>) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            let started = Instant::now();
            let result = self.fetch_raw(request).await;
            metrics::record_fetch(started, result.is_ok());
            if let Err(e) = &result {
                tracing::error!(url = request.url, method = request.method, error = %e, "Fetch error");
            }
            result
        }
        .boxed()
    }
}

/// Status line and header block as received, ending in the blank line.
///
/// hyper records the origin's reason phrase only when it differs from the
/// canonical one, so the canonical phrase fills in otherwise.
fn render_head(response: &Response) -> Vec<u8> {
    let status = response.status();
    let mut head = format!("{:?} {}", response.version(), status.as_u16()).into_bytes();
    let reason = match response.extensions().get::<ReasonPhrase>() {
        Some(phrase) => Some(phrase.as_bytes()),
        None => status.canonical_reason().map(str::as_bytes),
    };
    if let Some(reason) = reason {
        head.push(b' ');
        head.extend_from_slice(reason);
    }
    head.extend_from_slice(b"\r\n");

    for (name, value) in response.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}
