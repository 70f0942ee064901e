//! `cortex_alertmanager`: a tenant's alertmanager configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, non_empty, same_tenant, yaml_equivalent, Resource};
use crate::error::ProviderError;
use crate::factory::ClientFactory;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Type name of the alertmanager resource.
pub const ALERTMANAGER_RESOURCE: &str = "cortex_alertmanager";

/// ID used when the resource does not name a tenant.
pub const DEFAULT_TENANT_ID: &str = "default";

/// State of a `cortex_alertmanager` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertmanagerState {
    /// The alertmanager configuration document.
    pub config_yaml: String,
    /// Notification templates, by file name.
    #[serde(default)]
    pub templates: Option<BTreeMap<String, String>>,
    /// Tenant the configuration belongs to. Unset means the provider's tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// The tenant ID, or `default`.
    #[serde(default)]
    pub id: Option<String>,
}

impl AlertmanagerState {
    fn tenant(&self) -> &str {
        non_empty(&self.tenant_id).unwrap_or("")
    }

    fn with_id(mut self) -> Self {
        self.id = Some(alertmanager_id(non_empty(&self.tenant_id)));
        self
    }

    fn into_value(self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }
}

fn alertmanager_id(tenant: Option<&str>) -> String {
    tenant.unwrap_or(DEFAULT_TENANT_ID).to_string()
}

fn templates_of(value: &Value) -> Option<&serde_json::Map<String, Value>> {
    value.as_object().filter(|m| !m.is_empty())
}

/// Manages the alertmanager configuration of one tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertmanagerResource;

impl AlertmanagerResource {
    async fn push(
        &self,
        factory: &ClientFactory,
        state: AlertmanagerState,
    ) -> Result<Value, ProviderError> {
        let client = factory.make_client(state.tenant())?;
        let templates = state.templates.clone().unwrap_or_default();
        client
            .create_alertmanager_config(&state.config_yaml, &templates)
            .await?;
        info!(
            tenant = %client.tenant_id(),
            templates = templates.len(),
            "Stored alertmanager configuration"
        );
        state.with_id().into_value()
    }
}

#[async_trait::async_trait]
impl Resource for AlertmanagerResource {
    fn type_name(&self) -> &'static str {
        ALERTMANAGER_RESOURCE
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Alertmanager configuration of one Cortex tenant")
            .with_attribute(
                "config_yaml",
                Attribute::required_string().with_description("Alertmanager configuration"),
            )
            .with_attribute(
                "templates",
                Attribute::optional_string_map()
                    .with_description("Notification templates, keyed by file name"),
            )
            .with_attribute(
                "tenant_id",
                Attribute::optional_string()
                    .with_description("Tenant owning the configuration, defaults to the provider's")
                    .with_force_new(),
            )
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Resource identifier"),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let Some(config_yaml) = config["config_yaml"].as_str() else {
            return Vec::new();
        };
        match serde_yaml::from_str::<serde_yaml::Value>(config_yaml) {
            Ok(serde_yaml::Value::Mapping(_)) => Vec::new(),
            Ok(_) => vec![Diagnostic::error("Alertmanager configuration must be a YAML mapping")
                .with_attribute("config_yaml")],
            Err(e) => vec![Diagnostic::error("Invalid alertmanager configuration")
                .with_detail(e.to_string())
                .with_attribute("config_yaml")],
        }
    }

    fn planned_id(&self, proposed: &Value) -> Option<String> {
        Some(alertmanager_id(
            proposed["tenant_id"].as_str().filter(|t| !t.is_empty()),
        ))
    }

    fn equivalent(&self, attribute: &str, before: &Value, after: &Value) -> bool {
        match attribute {
            "config_yaml" => match (before.as_str(), after.as_str()) {
                (Some(before), Some(after)) => yaml_equivalent(before, after),
                _ => before == after,
            },
            // An empty map and no map send the same request.
            "templates" => templates_of(before) == templates_of(after),
            "tenant_id" => same_tenant(before, after),
            _ => before == after,
        }
    }

    async fn create(&self, factory: &ClientFactory, planned: Value) -> Result<Value, ProviderError> {
        let state: AlertmanagerState = decode_state(ALERTMANAGER_RESOURCE, planned)?;
        self.push(factory, state).await
    }

    async fn read(&self, factory: &ClientFactory, current: Value) -> Result<Value, ProviderError> {
        let state: AlertmanagerState = decode_state(ALERTMANAGER_RESOURCE, current)?;
        let client = factory.make_client(state.tenant())?;

        let remote = match client.get_alertmanager_config().await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                debug!(tenant = %client.tenant_id(), "Alertmanager configuration is gone");
                return Ok(Value::Null);
            },
            Err(e) => return Err(e.into()),
        };

        let config_yaml = if yaml_equivalent(&state.config_yaml, &remote.alertmanager_config) {
            state.config_yaml.clone()
        } else {
            remote.alertmanager_config
        };
        let templates = match (&state.templates, remote.template_files.is_empty()) {
            (None, true) => None,
            (Some(stored), true) if stored.is_empty() => Some(BTreeMap::new()),
            _ => Some(remote.template_files),
        };

        AlertmanagerState {
            config_yaml,
            templates,
            ..state
        }
        .with_id()
        .into_value()
    }

    async fn update(
        &self,
        factory: &ClientFactory,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let state: AlertmanagerState = decode_state(ALERTMANAGER_RESOURCE, planned)?;
        self.push(factory, state).await
    }

    async fn delete(&self, factory: &ClientFactory, current: Value) -> Result<(), ProviderError> {
        let state: AlertmanagerState = decode_state(ALERTMANAGER_RESOURCE, current)?;
        let client = factory.make_client(state.tenant())?;
        match client.delete_alertmanager_config().await {
            Ok(()) => {},
            Err(e) if e.is_not_found() => {},
            Err(e) => return Err(e.into()),
        }
        info!(tenant = %client.tenant_id(), "Deleted alertmanager configuration");
        Ok(())
    }

    async fn import(&self, factory: &ClientFactory, id: &str) -> Result<Value, ProviderError> {
        let tenant = (!id.is_empty() && id != DEFAULT_TENANT_ID).then_some(id);
        let client = factory.make_client(tenant.unwrap_or(""))?;

        let remote = client.get_alertmanager_config().await.map_err(|e| {
            if e.is_not_found() {
                ProviderError::NotFound(format!(
                    "tenant {:?} has no alertmanager configuration",
                    client.tenant_id()
                ))
            } else {
                e.into()
            }
        })?;

        AlertmanagerState {
            config_yaml: remote.alertmanager_config,
            templates: (!remote.template_files.is_empty()).then_some(remote.template_files),
            tenant_id: tenant.map(str::to_string),
            id: None,
        }
        .with_id()
        .into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_config_yaml() {
        let validate = |config_yaml: &str| {
            AlertmanagerResource.validate(&json!({ "config_yaml": config_yaml }))
        };

        assert!(validate("route:\n  receiver: team\nreceivers:\n  - name: team\n").is_empty());
        assert_eq!(
            validate("- a\n- b\n")[0].summary,
            "Alertmanager configuration must be a YAML mapping"
        );
        assert_eq!(
            validate("route: [")[0].summary,
            "Invalid alertmanager configuration"
        );
        // type errors are reported by schema validation
        assert!(AlertmanagerResource.validate(&json!({"config_yaml": 1})).is_empty());
    }

    #[test]
    fn test_planned_id() {
        assert_eq!(
            AlertmanagerResource.planned_id(&json!({"tenant_id": "team-a"})),
            Some("team-a".to_string())
        );
        assert_eq!(
            AlertmanagerResource.planned_id(&json!({"tenant_id": null})),
            Some("default".to_string())
        );
    }

    #[test]
    fn test_equivalent_templates() {
        let r = AlertmanagerResource;
        assert!(r.equivalent("templates", &Value::Null, &json!({})));
        assert!(!r.equivalent("templates", &Value::Null, &json!({"a": "b"})));
        assert!(r.equivalent("config_yaml", &json!("a: 1"), &json!("{a: 1}")));
        assert!(!r.equivalent("tenant_id", &json!("a"), &json!("b")));
    }

    #[test]
    fn test_state_id() {
        let state = AlertmanagerState {
            config_yaml: "route: {}".to_string(),
            templates: None,
            tenant_id: Some(String::new()),
            id: None,
        }
        .with_id();
        assert_eq!(state.id.as_deref(), Some("default"));
        assert_eq!(state.tenant(), "");
    }
}
