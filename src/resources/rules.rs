//! `cortex_rules`: every rule group of one namespace, as a rule file.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode_state, non_empty, same_tenant, yaml_equivalent, Resource};
use crate::client::{RuleGroup, RuleGroups};
use crate::error::ProviderError;
use crate::factory::ClientFactory;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Type name of the rules resource.
pub const RULES_RESOURCE: &str = "cortex_rules";

/// State of a `cortex_rules` resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesState {
    /// The rule namespace.
    pub namespace: String,
    /// The rule file: a YAML document with a `groups` list.
    pub content: String,
    /// Tenant owning the namespace. Unset means the provider's tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// `namespace`, or `tenant_id/namespace` when a tenant is set.
    #[serde(default)]
    pub id: Option<String>,
}

impl RulesState {
    fn tenant(&self) -> &str {
        non_empty(&self.tenant_id).unwrap_or("")
    }

    fn groups(&self) -> Result<RuleGroups, ProviderError> {
        RuleGroups::from_yaml(&self.content).map_err(|e| {
            ProviderError::Validation(format!(
                "content of namespace {:?} is not a valid rule file: {}",
                self.namespace, e
            ))
        })
    }

    fn with_id(mut self) -> Self {
        self.id = Some(rules_id(non_empty(&self.tenant_id), &self.namespace));
        self
    }

    fn into_value(self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// The ID of the rules of `namespace`, scoped by `tenant` when set.
pub fn rules_id(tenant: Option<&str>, namespace: &str) -> String {
    match tenant {
        Some(tenant) => format!("{}/{}", tenant, namespace),
        None => namespace.to_string(),
    }
}

/// Split an import ID into tenant and namespace.
///
/// `team-a/infra` is namespace `infra` of tenant `team-a`; an ID without a
/// slash is a namespace of the provider's tenant.
pub fn parse_rules_id(id: &str) -> Result<(Option<&str>, &str), ProviderError> {
    let (tenant, namespace) = match id.split_once('/') {
        Some((tenant, namespace)) => (Some(tenant), namespace),
        None => (None, id),
    };
    if namespace.is_empty() || tenant.is_some_and(str::is_empty) {
        return Err(ProviderError::InvalidRequest(format!(
            "invalid {} import ID {:?}: expected <namespace> or <tenant_id>/<namespace>",
            RULES_RESOURCE, id
        )));
    }
    Ok((tenant, namespace))
}

/// Whether two group lists hold the same groups, regardless of order.
fn same_groups(a: &[RuleGroup], b: &[RuleGroup]) -> bool {
    let by_name = |groups: &[RuleGroup]| -> BTreeMap<String, RuleGroup> {
        groups.iter().map(|g| (g.name.clone(), g.clone())).collect()
    };
    a.len() == b.len() && by_name(a) == by_name(b)
}

/// Manages the rule groups of a namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesResource;

#[async_trait::async_trait]
impl Resource for RulesResource {
    fn type_name(&self) -> &'static str {
        RULES_RESOURCE
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Rule groups of one Cortex ruler namespace")
            .with_attribute(
                "namespace",
                Attribute::required_string()
                    .with_description("Ruler namespace holding the groups")
                    .with_force_new(),
            )
            .with_attribute(
                "content",
                Attribute::required_string()
                    .with_description("Rule file: a YAML document with a `groups` list"),
            )
            .with_attribute(
                "tenant_id",
                Attribute::optional_string()
                    .with_description("Tenant owning the namespace, defaults to the provider's")
                    .with_force_new(),
            )
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Resource identifier"),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if config["namespace"].as_str() == Some("") {
            diagnostics.push(
                Diagnostic::error("Namespace must not be empty").with_attribute("namespace"),
            );
        }

        let Some(content) = config["content"].as_str() else {
            return diagnostics;
        };
        let groups = match RuleGroups::from_yaml(content) {
            Ok(groups) => groups,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::error("Invalid rule file")
                        .with_detail(e.to_string())
                        .with_attribute("content"),
                );
                return diagnostics;
            },
        };

        if groups.groups.is_empty() {
            diagnostics.push(
                Diagnostic::error("Rule file has no groups").with_attribute("content"),
            );
        }

        let mut seen = BTreeSet::new();
        for group in &groups.groups {
            if group.name.is_empty() {
                diagnostics.push(
                    Diagnostic::error("Rule group name must not be empty")
                        .with_attribute("content"),
                );
                continue;
            }
            if !seen.insert(group.name.as_str()) {
                diagnostics.push(
                    Diagnostic::error(format!("Duplicate rule group {:?}", group.name))
                        .with_attribute("content"),
                );
            }
            for (i, rule) in group.rules.iter().enumerate() {
                let named = rule.record.is_some() as u8 + rule.alert.is_some() as u8;
                if named != 1 {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "Rule {} of group {:?} must set exactly one of record or alert",
                            i, group.name
                        ))
                        .with_attribute("content"),
                    );
                }
                if rule.expr.trim().is_empty() {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "Rule {} of group {:?} has an empty expr",
                            i, group.name
                        ))
                        .with_attribute("content"),
                    );
                }
            }
        }

        diagnostics
    }

    fn planned_id(&self, proposed: &Value) -> Option<String> {
        let namespace = proposed["namespace"].as_str()?;
        let tenant = proposed["tenant_id"].as_str().filter(|t| !t.is_empty());
        Some(rules_id(tenant, namespace))
    }

    fn equivalent(&self, attribute: &str, before: &Value, after: &Value) -> bool {
        match (attribute, before.as_str(), after.as_str()) {
            ("content", Some(before), Some(after)) => yaml_equivalent(before, after),
            ("tenant_id", _, _) => same_tenant(before, after),
            _ => before == after,
        }
    }

    async fn create(&self, factory: &ClientFactory, planned: Value) -> Result<Value, ProviderError> {
        let state: RulesState = decode_state(RULES_RESOURCE, planned)?;
        let groups = state.groups()?;
        let client = factory.make_client(state.tenant())?;

        for group in &groups.groups {
            client.create_rule_group(&state.namespace, group).await?;
        }
        info!(
            namespace = %state.namespace,
            tenant = %client.tenant_id(),
            groups = groups.groups.len(),
            "Created rule groups"
        );

        state.with_id().into_value()
    }

    async fn read(&self, factory: &ClientFactory, current: Value) -> Result<Value, ProviderError> {
        let state: RulesState = decode_state(RULES_RESOURCE, current)?;
        let client = factory.make_client(state.tenant())?;

        let remote = match client.list_rules(&state.namespace).await {
            Ok(mut namespaces) => namespaces.remove(&state.namespace).unwrap_or_default(),
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if remote.is_empty() {
            debug!(namespace = %state.namespace, "Rule namespace is gone");
            return Ok(Value::Null);
        }

        let unchanged = state
            .groups()
            .map(|stored| same_groups(&stored.groups, &remote))
            .unwrap_or(false);
        let content = if unchanged {
            state.content.clone()
        } else {
            debug!(namespace = %state.namespace, "Rule groups changed remotely");
            RuleGroups { groups: remote }.to_yaml()?
        };

        RulesState { content, ..state }.with_id().into_value()
    }

    async fn update(
        &self,
        factory: &ClientFactory,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: RulesState = decode_state(RULES_RESOURCE, prior)?;
        let planned: RulesState = decode_state(RULES_RESOURCE, planned)?;
        let groups = planned.groups()?;
        let client = factory.make_client(planned.tenant())?;

        for group in &groups.groups {
            client.create_rule_group(&planned.namespace, group).await?;
        }

        // Groups dropped from the file are deleted from the namespace.
        let kept: BTreeSet<&str> = groups.groups.iter().map(|g| g.name.as_str()).collect();
        let previous = prior.groups().map(|g| g.groups).unwrap_or_default();
        for group in previous.iter().filter(|g| !kept.contains(g.name.as_str())) {
            match client.delete_rule_group(&prior.namespace, &group.name).await {
                Ok(()) => {},
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(e.into()),
            }
            debug!(namespace = %prior.namespace, group = %group.name, "Deleted rule group");
        }

        info!(namespace = %planned.namespace, groups = groups.groups.len(), "Updated rule groups");
        planned.with_id().into_value()
    }

    async fn delete(&self, factory: &ClientFactory, current: Value) -> Result<(), ProviderError> {
        let state: RulesState = decode_state(RULES_RESOURCE, current)?;
        let groups = state.groups()?;
        let client = factory.make_client(state.tenant())?;

        for group in &groups.groups {
            match client.delete_rule_group(&state.namespace, &group.name).await {
                Ok(()) => {},
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(e.into()),
            }
        }
        info!(namespace = %state.namespace, "Deleted rule groups");
        Ok(())
    }

    async fn import(&self, factory: &ClientFactory, id: &str) -> Result<Value, ProviderError> {
        let (tenant, namespace) = parse_rules_id(id)?;
        let client = factory.make_client(tenant.unwrap_or(""))?;

        let groups = match client.list_rules(namespace).await {
            Ok(mut namespaces) => namespaces.remove(namespace).unwrap_or_default(),
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if groups.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "rule namespace {:?} has no groups",
                id
            )));
        }

        RulesState {
            namespace: namespace.to_string(),
            content: RuleGroups { groups }.to_yaml()?,
            tenant_id: tenant.map(str::to_string),
            id: None,
        }
        .with_id()
        .into_value()
    }
}
