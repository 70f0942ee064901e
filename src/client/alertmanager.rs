//! Alertmanager configuration API.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientError, CortexClient};

const ALERTS_PATH: [&str; 3] = ["api", "v1", "alerts"];

/// A tenant's alertmanager configuration and its notification templates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    /// Template file name to template body.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_files: BTreeMap<String, String>,
    /// The alertmanager configuration document.
    #[serde(default)]
    pub alertmanager_config: String,
}

impl CortexClient {
    /// Create or replace the tenant's alertmanager configuration.
    pub async fn create_alertmanager_config(
        &self,
        config: &str,
        templates: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        let payload = AlertmanagerConfig {
            template_files: templates.clone(),
            alertmanager_config: config.to_string(),
        };
        let body = serde_yaml::to_string(&payload)?;
        self.send(Method::POST, &ALERTS_PATH, Some(body.into_bytes()))
            .await?;
        Ok(())
    }

    /// Fetch the tenant's alertmanager configuration.
    pub async fn get_alertmanager_config(&self) -> Result<AlertmanagerConfig, ClientError> {
        let response = self.send(Method::GET, &ALERTS_PATH, None).await?;
        Ok(serde_yaml::from_slice(&response.body)?)
    }

    /// Delete the tenant's alertmanager configuration.
    pub async fn delete_alertmanager_config(&self) -> Result<(), ClientError> {
        self.send(Method::DELETE, &ALERTS_PATH, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let mut templates = BTreeMap::new();
        templates.insert("default.tmpl".to_string(), "{{ define \"x\" }}{{ end }}".to_string());
        let payload = AlertmanagerConfig {
            template_files: templates,
            alertmanager_config: "route:\n  receiver: team\n".to_string(),
        };

        let yaml = serde_yaml::to_string(&payload).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            value["alertmanager_config"].as_str(),
            Some("route:\n  receiver: team\n")
        );
        assert!(value["template_files"]["default.tmpl"].is_string());
    }

    #[test]
    fn test_payload_without_templates() {
        let payload: AlertmanagerConfig =
            serde_yaml::from_str("alertmanager_config: |\n  route: {}\n").unwrap();
        assert!(payload.template_files.is_empty());
        assert_eq!(payload.alertmanager_config, "route: {}\n");

        let yaml = serde_yaml::to_string(&payload).unwrap();
        assert!(!yaml.contains("template_files"));
    }
}
