//! HTTP transports used by [`CortexClient`](super::CortexClient).
//!
//! A [`Transport`] performs one request/response exchange. [`HttpTransport`]
//! sends requests with `reqwest`; [`LoggingTransport`] wraps any other
//! transport and writes every exchange to the `tracing` log at `debug` level
//! without touching the request or the response.
//!
//! ```bash
//! # Dump every request sent to Cortex
//! RUST_LOG=cortex_provider::client::transport=debug ./cortex-provider
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

use super::error::ClientError;

/// Basic auth credentials attached to a request.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// The user name.
    pub username: String,
    /// The password.
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The request method.
    pub method: Method,
    /// The absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Basic auth credentials, applied by the sending transport.
    pub basic_auth: Option<BasicAuth>,
    /// The request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            basic_auth: None,
            body: None,
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Performs a single HTTP exchange.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send `request` and return the complete response.
    ///
    /// Non-success statuses are returned as responses, not errors.
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// Sends requests over the network with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cortex-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Build a transport around an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(auth) = request.basic_auth {
            builder = builder.basic_auth(auth.username, Some(auth.password));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

static DEFAULT_TRANSPORT: OnceLock<Arc<HttpTransport>> = OnceLock::new();

/// The process-wide transport used when a client has none of its own.
///
/// All callers share one connection pool.
pub fn default_transport() -> Result<Arc<dyn Transport>, ClientError> {
    if let Some(transport) = DEFAULT_TRANSPORT.get() {
        return Ok(Arc::clone(transport) as Arc<dyn Transport>);
    }
    let transport = Arc::new(HttpTransport::new()?);
    let shared = DEFAULT_TRANSPORT.get_or_init(|| transport);
    Ok(Arc::clone(shared) as Arc<dyn Transport>)
}

/// Logs every exchange of an inner transport.
///
/// Requests and responses pass through unchanged. Authorization headers and
/// basic auth credentials are never logged.
#[derive(Debug)]
pub struct LoggingTransport {
    name: String,
    inner: Arc<dyn Transport>,
}

impl LoggingTransport {
    /// Wrap `inner`, tagging log lines with `name`.
    pub fn new(name: impl Into<String>, inner: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    /// The name attached to log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &Arc<dyn Transport> {
        &self.inner
    }
}

#[async_trait::async_trait]
impl Transport for LoggingTransport {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        debug!(
            name = %self.name,
            method = %request.method,
            url = %request.url,
            headers = ?redact_headers(&request.headers),
            basic_auth = request.basic_auth.is_some(),
            body = %body_text(request.body.as_deref()),
            "Sending HTTP request"
        );

        let method = request.method.clone();
        let url = request.url.clone();
        let result = self.inner.round_trip(request).await;

        match &result {
            Ok(response) => debug!(
                name = %self.name,
                method = %method,
                url = %url,
                status = %response.status,
                headers = ?redact_headers(&response.headers),
                body = %response.text(),
                "Received HTTP response"
            ),
            Err(e) => debug!(
                name = %self.name,
                method = %method,
                url = %url,
                error = %e,
                "HTTP request failed"
            ),
        }

        result
    }
}

fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut redacted = headers.clone();
    if redacted.contains_key(AUTHORIZATION) {
        redacted.insert(AUTHORIZATION, HeaderValue::from_static("<redacted>"));
    }
    redacted
}

fn body_text(body: Option<&[u8]>) -> Cow<'_, str> {
    match body {
        Some(bytes) => String::from_utf8_lossy(bytes),
        None => Cow::Borrowed(""),
    }
}
