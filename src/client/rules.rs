//! Ruler API: rule groups stored per namespace.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientError, CortexClient};

const RULER_PREFIX: [&str; 3] = ["api", "v1", "rules"];
const LEGACY_RULER_PREFIX: [&str; 3] = ["api", "prom", "rules"];

/// A single recording or alerting rule.
///
/// Fields this type does not model are kept in `extra` so that they survive
/// a round trip through the provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Name of the series a recording rule writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    /// Name of the alert an alerting rule fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// The query expression.
    pub expr: String,
    /// How long the condition must hold before the alert fires.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    /// Labels added to the result.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations attached to alerts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Any other rule fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A named group of rules evaluated together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Group name, unique within a namespace.
    pub name: String,
    /// Evaluation interval, e.g. `1m`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Tenants whose data the group queries (federated rule groups).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_tenants: Vec<String>,
    /// The rules of this group.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Any other group fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A rule file: the `groups:` document users write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleGroups {
    /// The groups in file order.
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

impl RuleGroups {
    /// Parse a rule file.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Render as a rule file.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Find a group by name.
    pub fn group(&self, name: &str) -> Option<&RuleGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Rule groups keyed by namespace, as returned by the list endpoint.
pub type RuleNamespaces = BTreeMap<String, Vec<RuleGroup>>;

impl CortexClient {
    fn rules_path<'a>(&self, rest: &[&'a str]) -> Vec<&'a str> {
        let prefix: [&'a str; 3] = if self.config.use_legacy_routes {
            LEGACY_RULER_PREFIX
        } else {
            RULER_PREFIX
        };
        prefix.iter().copied().chain(rest.iter().copied()).collect()
    }

    /// Create or replace `group` in `namespace`.
    pub async fn create_rule_group(
        &self,
        namespace: &str,
        group: &RuleGroup,
    ) -> Result<(), ClientError> {
        let body = serde_yaml::to_string(group)?;
        self.send(
            Method::POST,
            &self.rules_path(&[namespace]),
            Some(body.into_bytes()),
        )
        .await?;
        Ok(())
    }

    /// Fetch one rule group.
    pub async fn get_rule_group(
        &self,
        namespace: &str,
        group: &str,
    ) -> Result<RuleGroup, ClientError> {
        let response = self
            .send(Method::GET, &self.rules_path(&[namespace, group]), None)
            .await?;
        Ok(serde_yaml::from_slice(&response.body)?)
    }

    /// List the rule groups of `namespace`, or of every namespace when empty.
    pub async fn list_rules(&self, namespace: &str) -> Result<RuleNamespaces, ClientError> {
        let path = if namespace.is_empty() {
            self.rules_path(&[])
        } else {
            self.rules_path(&[namespace])
        };
        let response = self.send(Method::GET, &path, None).await?;
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RuleNamespaces::new());
        }
        Ok(serde_yaml::from_slice(&response.body)?)
    }

    /// Delete one rule group.
    pub async fn delete_rule_group(&self, namespace: &str, group: &str) -> Result<(), ClientError> {
        self.send(Method::DELETE, &self.rules_path(&[namespace, group]), None)
            .await?;
        Ok(())
    }
}
