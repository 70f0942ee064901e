//! Per-tenant client construction.

use std::sync::Arc;

use tracing::debug;

use crate::client::{
    default_transport, ClientConfig, ClientError, CortexClient, LoggingTransport, Transport,
};
use crate::config::{Backend, ProviderConfig};

/// Name attached to the log lines of every client's transport.
pub const TRANSPORT_LOG_NAME: &str = "cortex";

/// Builds [`CortexClient`]s for arbitrary tenants from the provider config.
///
/// The factory only reads its configuration, so one instance can be shared
/// by any number of concurrent resource operations.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    config: Arc<ProviderConfig>,
}

impl ClientFactory {
    /// Create a factory over the resolved provider configuration.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration clients are built from.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The tenant a client for `tenant_id` acts for.
    ///
    /// An empty `tenant_id` means the configured default tenant.
    pub fn effective_tenant<'a>(&'a self, tenant_id: &'a str) -> &'a str {
        if tenant_id.is_empty() {
            &self.config.tenant_id
        } else {
            tenant_id
        }
    }

    /// The client configuration used for `tenant_id`.
    pub fn client_config(&self, tenant_id: &str) -> ClientConfig {
        ClientConfig {
            key: self.config.api_key.clone(),
            address: self.config.address.clone(),
            tenant_id: self.effective_tenant(tenant_id).to_string(),
            user: self.config.user.clone(),
            use_legacy_routes: self.config.backend == Backend::Loki,
        }
    }

    /// Build a client for `tenant_id` whose transport logs every exchange.
    ///
    /// Construction errors from [`CortexClient::new`] are returned unchanged.
    pub fn make_client(&self, tenant_id: &str) -> Result<CortexClient, ClientError> {
        let mut client = CortexClient::new(self.client_config(tenant_id))?;

        let inner: Arc<dyn Transport> = match client.transport() {
            Some(transport) => Arc::clone(transport),
            None => default_transport()?,
        };
        client.set_transport(Arc::new(LoggingTransport::new(TRANSPORT_LOG_NAME, inner)));

        debug!(
            tenant = %client.tenant_id(),
            legacy_routes = client.config().use_legacy_routes,
            "Built Cortex client"
        );
        Ok(client)
    }
}
