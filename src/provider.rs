//! The Cortex provider: configuration, dispatch and resource lifecycles.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{apply_env_defaults, provider_config_schema, ProviderConfig, RawProviderConfig};
use crate::error::ProviderError;
use crate::factory::ClientFactory;
use crate::resources::plan::plan_resource;
use crate::resources::ResourceRegistry;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Manages Cortex (and Loki) rule groups and alertmanager configurations.
///
/// Resource operations need a configured provider; until `configure`
/// succeeds they fail with a configuration error.
pub struct CortexProvider {
    resources: ResourceRegistry,
    factory: RwLock<Option<ClientFactory>>,
    env: EnvLookup,
}

impl CortexProvider {
    /// A provider reading defaults from the process environment.
    pub fn new() -> Self {
        Self::with_env_lookup(|name| std::env::var(name).ok())
    }

    /// A provider looking up environment defaults with `env`.
    pub fn with_env_lookup<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            resources: ResourceRegistry::default(),
            factory: RwLock::new(None),
            env: Arc::new(env),
        }
    }

    /// The registered resource types.
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// The client factory, once configured.
    pub async fn factory(&self) -> Option<ClientFactory> {
        self.factory.read().await.clone()
    }

    async fn require_factory(&self) -> Result<ClientFactory, ProviderError> {
        self.factory()
            .await
            .ok_or_else(|| ProviderError::Configuration("provider is not configured".to_string()))
    }
}

impl Default for CortexProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CortexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CortexProvider")
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ProviderService for CortexProvider {
    fn schema(&self) -> ProviderSchema {
        self.resources.iter().fold(
            ProviderSchema::new().with_provider_config(provider_config_schema()),
            |schema, resource| schema.with_resource(resource.type_name(), resource.schema()),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = apply_env_defaults(&config, |name| (self.env)(name));
        let mut diagnostics = validate(&provider_config_schema(), &config);

        if let Ok(raw) = RawProviderConfig::from_value(config) {
            if let Some(backend) = raw.unknown_backend() {
                diagnostics.push(
                    Diagnostic::warning(format!("Unrecognized backend {:?}", backend))
                        .with_detail("Supported backends are cortex and loki; cortex routes are used")
                        .with_attribute("backend"),
                );
            }
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let raw = RawProviderConfig::from_value(config)?;
        let config = ProviderConfig::resolve_with(raw, |name| (self.env)(name));

        if config.address.is_empty() {
            return Ok(vec![Diagnostic::error("Missing Cortex address")
                .with_detail("Set the address option or the CORTEX_ADDRESS environment variable")
                .with_attribute("address")]);
        }

        info!(
            address = %config.address,
            tenant = %config.tenant_id,
            backend = %config.backend,
            "Configured Cortex provider"
        );
        *self.factory.write().await = Some(ClientFactory::new(config));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if self.factory.write().await.take().is_some() {
            info!("Cortex provider stopped");
        }
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resources.get(resource_type)?;
        let mut diagnostics = validate(&resource.schema(), &config);
        diagnostics.extend(resource.validate(&config));
        Ok(diagnostics)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resources.get(resource_type)?;
        let prior_state = prior_state.filter(|state| !state.is_null());
        Ok(plan_resource(&**resource, prior_state, proposed_state))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resources.get(resource_type)?;
        let factory = self.require_factory().await?;
        resource.create(&factory, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resources.get(resource_type)?;
        if current_state.is_null() {
            return Ok(Value::Null);
        }
        let factory = self.require_factory().await?;
        resource.read(&factory, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resources.get(resource_type)?;
        let factory = self.require_factory().await?;
        resource.update(&factory, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resources.get(resource_type)?;
        if current_state.is_null() {
            warn!(resource_type, "Delete called without state");
            return Ok(());
        }
        let factory = self.require_factory().await?;
        resource.delete(&factory, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resources.get(resource_type)?;
        let factory = self.require_factory().await?;
        let state = resource.import(&factory, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::schema::DiagnosticSeverity;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn no_env() -> CortexProvider {
        CortexProvider::with_env_lookup(|_| None)
    }

    #[test]
    fn test_schema() {
        let schema = no_env().schema();
        assert!(schema.provider.attribute("address").is_some());
        assert!(schema.resources.contains_key("cortex_rules"));
        assert!(schema.resources.contains_key("cortex_alertmanager"));
        assert_eq!(
            no_env().metadata().resources,
            vec!["cortex_alertmanager", "cortex_rules"]
        );
    }

    #[tokio::test]
    async fn test_configure_from_env() {
        let provider = CortexProvider::with_env_lookup(|name| match name {
            "CORTEX_ADDRESS" => Some("http://cortex:9009".to_string()),
            "CORTEX_TENANT_ID" => Some("ops".to_string()),
            _ => None,
        });

        let diagnostics = provider.configure(json!({"backend": "loki"})).await.unwrap();
        assert!(diagnostics.is_empty());

        let factory = provider.factory().await.unwrap();
        assert_eq!(factory.config().address, "http://cortex:9009");
        assert_eq!(factory.config().tenant_id, "ops");
        assert_eq!(factory.config().backend, Backend::Loki);
    }

    #[tokio::test]
    async fn test_configure_without_address() {
        let provider = no_env();
        let diagnostics = provider.configure(json!({})).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("address"));
        assert!(provider.factory().await.is_none());
    }

    #[tokio::test]
    async fn test_configure_rejects_unknown_option() {
        let err = no_env()
            .configure(json!({"address": "http://x", "token": "t"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let provider = no_env();
        let diagnostics = provider
            .validate_provider_config(json!({"backend": "mimir"}))
            .await
            .unwrap();

        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Missing required attribute 'address'"));
        let warning = diagnostics
            .iter()
            .find(|d| d.severity == DiagnosticSeverity::Warning)
            .unwrap();
        assert_eq!(warning.attribute.as_deref(), Some("backend"));

        let env_provider =
            CortexProvider::with_env_lookup(|name| (name == "CORTEX_ADDRESS").then(|| "http://x".to_string()));
        let diagnostics = env_provider.validate_provider_config(Value::Null).await.unwrap();
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let provider = no_env();
        let diagnostics = provider
            .validate_resource_config("cortex_rules", json!({"namespace": "infra", "content": "groups: []"}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = provider
            .validate_resource_config("cortex_alertmanager", json!({}))
            .await
            .unwrap();
        assert!(diagnostics.iter().any(|d| d.summary.contains("config_yaml")));

        assert!(matches!(
            provider.validate_resource_config("cortex_dashboard", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_require_configure() {
        let provider = no_env();
        let state = json!({"config_yaml": "route: {}", "id": "default"});

        let err = provider.create("cortex_alertmanager", state.clone()).await.unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: provider is not configured");
        assert_err!(provider.read("cortex_alertmanager", state.clone()).await);
        assert_err!(provider.delete("cortex_alertmanager", state).await);
        assert_err!(provider.import_resource("cortex_alertmanager", "default").await);

        // planning is local
        let plan = provider
            .plan("cortex_alertmanager", None, json!({"config_yaml": "route: {}"}), Value::Null)
            .await
            .unwrap();
        assert_eq!(plan.planned_state["id"], "default");
    }

    #[tokio::test]
    async fn test_stop_forgets_configuration() {
        let provider = no_env();
        assert_ok!(provider.configure(json!({"address": "http://x"})).await);
        assert!(provider.factory().await.is_some());
        assert_ok!(provider.stop().await);
        assert!(provider.factory().await.is_none());
    }
}
