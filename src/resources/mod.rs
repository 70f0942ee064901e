//! Managed resource types.
//!
//! Each resource type implements [`Resource`]. The [`ResourceRegistry`] maps
//! type names to implementations and is what the provider dispatches on.

mod alertmanager;
pub mod plan;
mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ProviderError;
use crate::factory::ClientFactory;
use crate::schema::{Diagnostic, Schema};

pub use alertmanager::{AlertmanagerResource, AlertmanagerState, ALERTMANAGER_RESOURCE};
pub use rules::{RulesResource, RulesState, RULES_RESOURCE};

/// One resource type: its schema and its CRUD operations against Cortex.
///
/// States are the JSON objects the host stores; the schema's attributes are
/// their keys.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// The resource type name, e.g. `cortex_rules`.
    fn type_name(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// Checks beyond the schema (types and required attributes are already
    /// validated when this is called).
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// The `id` a resource with this configuration will get.
    fn planned_id(&self, proposed: &Value) -> Option<String>;

    /// Whether two values of `attribute` mean the same thing remotely.
    fn equivalent(&self, attribute: &str, before: &Value, after: &Value) -> bool {
        let _ = attribute;
        before == after
    }

    /// Create the remote object and return the new state.
    async fn create(&self, factory: &ClientFactory, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh the state. Returns `Value::Null` when the object is gone.
    async fn read(&self, factory: &ClientFactory, current: Value) -> Result<Value, ProviderError>;

    /// Apply `planned` over `prior` and return the new state.
    async fn update(
        &self,
        factory: &ClientFactory,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object. Deleting something already gone succeeds.
    async fn delete(&self, factory: &ClientFactory, current: Value) -> Result<(), ProviderError>;

    /// Build the state of an existing remote object from an import ID.
    async fn import(&self, factory: &ClientFactory, id: &str) -> Result<Value, ProviderError>;
}

/// The resource types this provider manages, by name.
#[derive(Clone)]
pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// Register `resource` under its type name.
    pub fn with_resource(mut self, resource: impl Resource + 'static) -> Self {
        self.resources.insert(resource.type_name(), Arc::new(resource));
        self
    }

    /// Look up a resource type.
    pub fn get(&self, type_name: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// All registered resource types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Resource>> {
        self.resources.values()
    }

    /// The registered type names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }
}

impl Default for ResourceRegistry {
    /// `cortex_rules` and `cortex_alertmanager`.
    fn default() -> Self {
        Self::new()
            .with_resource(RulesResource)
            .with_resource(AlertmanagerResource)
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.names())
            .finish()
    }
}

/// Whether two YAML documents parse to the same value.
///
/// Falls back to comparing the text when either side does not parse.
pub fn yaml_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (
        serde_yaml::from_str::<serde_yaml::Value>(a),
        serde_yaml::from_str::<serde_yaml::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// `Some(tenant)` for a non-empty tenant, `None` otherwise.
pub(crate) fn non_empty(tenant: &Option<String>) -> Option<&str> {
    tenant.as_deref().filter(|t| !t.is_empty())
}

/// Whether two `tenant_id` values select the same tenant.
///
/// `null`, absent and `""` all mean the provider's tenant.
pub(crate) fn same_tenant(before: &Value, after: &Value) -> bool {
    fn tenant(value: &Value) -> Option<Option<&str>> {
        match value {
            Value::Null => Some(None),
            Value::String(t) => Some(Some(t.as_str()).filter(|t| !t.is_empty())),
            _ => None,
        }
    }
    match (tenant(before), tenant(after)) {
        (Some(before), Some(after)) => before == after,
        _ => false,
    }
}

/// Decode a state or config object, naming the resource type on failure.
pub(crate) fn decode_state<T: serde::de::DeserializeOwned>(
    type_name: &str,
    value: Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::InvalidRequest(format!("invalid {} state: {}", type_name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = ResourceRegistry::default();
        assert_eq!(registry.names(), vec!["cortex_alertmanager", "cortex_rules"]);
        assert!(registry.get("cortex_rules").is_ok());

        let err = registry.get("cortex_dashboard").err().unwrap();
        assert!(matches!(err, ProviderError::UnknownResource(name) if name == "cortex_dashboard"));
    }

    #[test]
    fn test_yaml_equivalent() {
        assert!(yaml_equivalent("a: 1\nb: 2\n", "{b: 2, a: 1}"));
        assert!(yaml_equivalent("route:\n  receiver: x\n", "route: {receiver: x}"));
        assert!(!yaml_equivalent("a: 1", "a: 2"));
        assert!(!yaml_equivalent("a: [", "a: 1"));
        assert!(yaml_equivalent("a: [", "a: ["));
    }

    #[test]
    fn test_same_tenant() {
        use serde_json::json;
        assert!(same_tenant(&Value::Null, &json!("")));
        assert!(same_tenant(&json!(""), &Value::Null));
        assert!(same_tenant(&json!("team-a"), &json!("team-a")));
        assert!(!same_tenant(&Value::Null, &json!("team-a")));
        assert!(!same_tenant(&json!(1), &Value::Null));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(&Some("team-a".to_string())), Some("team-a"));
        assert_eq!(non_empty(&Some(String::new())), None);
        assert_eq!(non_empty(&None), None);
    }
}
