//! HTTP client for the Cortex (and Loki) ruler and alertmanager APIs.
//!
//! A [`CortexClient`] is bound to one address, one set of credentials and one
//! tenant. Every request carries the tenant in the `X-Scope-OrgID` header.
//! Credentials are sent as basic auth: `user:api_key` when a user is set,
//! otherwise `tenant:api_key` when only an API key is set.

mod alertmanager;
mod error;
mod rules;
pub mod transport;

use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};

pub use alertmanager::AlertmanagerConfig;
pub use error::ClientError;
pub use rules::{Rule, RuleGroup, RuleGroups, RuleNamespaces};
pub use transport::{
    default_transport, BasicAuth, HttpRequest, HttpResponse, HttpTransport, LoggingTransport,
    Transport,
};

/// Header carrying the tenant ID on every request.
pub const SCOPE_ORG_ID_HEADER: HeaderName = HeaderName::from_static("x-scope-orgid");

/// Everything needed to build a [`CortexClient`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// API key, sent as the basic auth password.
    pub key: String,
    /// Base URL of the backend.
    pub address: String,
    /// Tenant the client acts for.
    pub tenant_id: String,
    /// Basic auth user. When empty the tenant ID is used as the user.
    pub user: String,
    /// Use the `/api/prom/rules` routes expected by Loki.
    pub use_legacy_routes: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("key", &redacted(&self.key))
            .field("address", &self.address)
            .field("tenant_id", &self.tenant_id)
            .field("user", &redacted(&self.user))
            .field("use_legacy_routes", &self.use_legacy_routes)
            .finish()
    }
}

pub(crate) fn redacted(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

/// A tenant-scoped client for one Cortex or Loki backend.
#[derive(Debug, Clone)]
pub struct CortexClient {
    config: ClientConfig,
    endpoint: Url,
    tenant_header: HeaderValue,
    transport: Option<Arc<dyn Transport>>,
}

impl CortexClient {
    /// Build a client from `config`.
    ///
    /// Fails if the address is not an absolute http(s) URL or the tenant ID
    /// cannot be sent as a header. No request is made. The client starts
    /// without a transport and falls back to [`default_transport`].
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint = parse_address(&config.address)?;
        let tenant_header = HeaderValue::from_str(&config.tenant_id)
            .map_err(|_| ClientError::InvalidTenant(config.tenant_id.clone()))?;

        Ok(Self {
            config,
            endpoint,
            tenant_header,
            transport: None,
        })
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The tenant this client acts for.
    pub fn tenant_id(&self) -> &str {
        &self.config.tenant_id
    }

    /// The parsed backend address.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The transport set on this client, if any.
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    /// Replace the transport used for requests.
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Builder-style variant of [`set_transport`](Self::set_transport).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.set_transport(transport);
        self
    }

    fn basic_auth(&self) -> Option<BasicAuth> {
        if !self.config.user.is_empty() {
            Some(BasicAuth {
                username: self.config.user.clone(),
                password: self.config.key.clone(),
            })
        } else if !self.config.key.is_empty() {
            Some(BasicAuth {
                username: self.config.tenant_id.clone(),
                password: self.config.key.clone(),
            })
        } else {
            None
        }
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidAddress {
                address: self.config.address.clone(),
                reason: "address cannot be used as a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Build the request for `method` on the given path segments.
    ///
    /// Segments are appended to the address path and percent-encoded.
    pub fn build_request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<HttpRequest, ClientError> {
        let url = self.url_for(segments)?;
        let mut headers = HeaderMap::new();
        headers.insert(SCOPE_ORG_ID_HEADER, self.tenant_header.clone());
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/yaml"));
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            basic_auth: self.basic_auth(),
            body,
        })
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, ClientError> {
        let request = self.build_request(method, segments, body)?;
        let path = request.url.path().to_string();
        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => default_transport()?,
        };

        let response = transport.round_trip(request).await?;
        check_response(response, path)
    }
}

fn parse_address(address: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {},
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    }
    if url.cannot_be_a_base() {
        return Err(invalid("address cannot be used as a base URL".to_string()));
    }
    Ok(url)
}

fn check_response(response: HttpResponse, path: String) -> Result<HttpResponse, ClientError> {
    if response.status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound { path });
    }
    if response.status.is_client_error() || response.status.is_server_error() {
        return Err(ClientError::Status {
            status: response.status,
            body: response.text().trim().to_string(),
        });
    }
    Ok(response)
}
