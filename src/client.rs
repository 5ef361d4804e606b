//! Client for talking to a running recording proxy.
//!
//! HTTPS targets cannot pass through the proxy (CONNECT is refused), so they
//! are requested as plain `http:` with the original URL carried in the
//! real-URL header. The proxy then fetches and keys on the HTTPS URL.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect, Client, Method, Proxy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::http::request::{FormFields, DEFAULT_REAL_URL_HEADER};
use crate::http::response::{ServedFrom, RESPONSE_STATUS_HEADER};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request through proxy failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("proxy connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("invalid method `{0}`")]
    InvalidMethod(String),

    #[error("invalid header `{0}`")]
    InvalidHeader(String),
}

/// A response as seen by a proxy client.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Present when the proxy runs with debug headers.
    pub served_from: Option<ServedFrom>,
}

impl ClientResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builder-style client bound to one proxy address.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    proxy_addr: SocketAddr,
    real_url_header: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl ProxyClient {
    pub fn new(proxy_addr: SocketAddr) -> Self {
        Self {
            proxy_addr,
            real_url_header: DEFAULT_REAL_URL_HEADER.to_string(),
            headers: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Extra header sent with every fetch.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_real_url_header(mut self, name: impl Into<String>) -> Self {
        self.real_url_header = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    /// The URL to request through the proxy and, for HTTPS, the original URL.
    pub fn effective_url(&self, url: &str) -> Result<(String, Option<String>), ClientError> {
        let mut parsed = Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" => Ok((parsed.to_string(), None)),
            "https" => {
                parsed
                    .set_scheme("http")
                    .map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
                Ok((parsed.to_string(), Some(url.to_string())))
            }
            _ => Err(ClientError::InvalidUrl(url.to_string())),
        }
    }

    /// Fetch `url` through the proxy. `form` is sent URL-encoded for POST.
    pub async fn fetch(&self, url: &str, method: &str, form: &FormFields) -> Result<ClientResponse, ClientError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ClientError::InvalidMethod(method.to_string()))?;
        let (target, real_url) = self.effective_url(url)?;

        let client = Client::builder()
            .proxy(Proxy::http(format!("http://{}", self.proxy_addr))?)
            .redirect(redirect::Policy::none())
            .timeout(self.timeout)
            .build()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.insert(header_name(name)?, header_value(value)?);
        }
        if let Some(real_url) = real_url {
            headers.insert(header_name(&self.real_url_header)?, header_value(&real_url)?);
        }

        let mut request = client.request(method.clone(), &target).headers(headers);
        if method == Method::POST {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
                .body(form.encode());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(n, v)| (n.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes().await?.to_vec();

        let served_from = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(RESPONSE_STATUS_HEADER))
            .and_then(|(_, v)| ServedFrom::from_header_value(v));

        tracing::debug!(url = %url, status, served_from = ?served_from, bytes = body.len(), "Fetched through proxy");
        Ok(ClientResponse { status, headers, body, served_from })
    }

    /// Ask the proxy to stop accepting connections.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let mut stream = TcpStream::connect(self.proxy_addr).await?;
        stream.write_all(b"SHUTDOWN\r\n\r\n").await?;

        let mut ack = Vec::new();
        tokio::time::timeout(self.timeout, stream.read_to_end(&mut ack))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no shutdown acknowledgement"))??;
        tracing::info!(proxy = %self.proxy_addr, "Shutdown sent");
        Ok(())
    }
}

fn header_name(name: &str) -> Result<HeaderName, ClientError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| ClientError::InvalidHeader(name.to_string()))
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(value.to_string()))
}
