//! Provider configuration.
//!
//! The host sends the provider block as JSON. It is decoded into
//! [`RawProviderConfig`] (every option optional, types checked) and then
//! resolved into a [`ProviderConfig`]: an explicit value wins, otherwise the
//! option's environment variable, otherwise its default.
//!
//! | Option | Env var | Default |
//! |---|---|---|
//! | `address` | `CORTEX_ADDRESS` | `""` |
//! | `api_key` | `CORTEX_API_KEY` | `""` |
//! | `user` | `CORTEX_API_USER` | `""` |
//! | `tenant_id` | `CORTEX_TENANT_ID` | `""` |
//! | `backend` | | `"cortex"` |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

/// Environment variable for `address`.
pub const ENV_CORTEX_ADDRESS: &str = "CORTEX_ADDRESS";
/// Environment variable for `api_key`.
pub const ENV_CORTEX_API_KEY: &str = "CORTEX_API_KEY";
/// Environment variable for `user`.
pub const ENV_CORTEX_USER: &str = "CORTEX_API_USER";
/// Environment variable for `tenant_id`.
pub const ENV_CORTEX_TENANT_ID: &str = "CORTEX_TENANT_ID";

/// Options that fall back to an environment variable, with that variable.
pub const ENV_DEFAULTS: [(&str, &str); 4] = [
    ("address", ENV_CORTEX_ADDRESS),
    ("api_key", ENV_CORTEX_API_KEY),
    ("user", ENV_CORTEX_USER),
    ("tenant_id", ENV_CORTEX_TENANT_ID),
];

/// The kind of backend the provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Cortex (or Mimir): `/api/v1/rules` routes.
    #[default]
    Cortex,
    /// Loki: legacy `/api/prom/rules` routes.
    Loki,
}

impl Backend {
    /// Parse a backend name. Returns `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cortex" => Some(Self::Cortex),
            "loki" => Some(Self::Loki),
            _ => None,
        }
    }

    /// The configuration name of this backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cortex => "cortex",
            Self::Loki => "loki",
        }
    }

    /// Whether requests use the legacy ruler routes.
    pub fn uses_legacy_routes(self) -> bool {
        matches!(self, Self::Loki)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provider block as sent by the host, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProviderConfig {
    /// Address of the Cortex cluster.
    #[serde(default)]
    pub address: Option<String>,
    /// API key, used as basic auth password.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Basic auth user.
    #[serde(default)]
    pub user: Option<String>,
    /// Default tenant ID.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Backend type.
    #[serde(default)]
    pub backend: Option<String>,
}

impl RawProviderConfig {
    /// Decode the provider block. `null` is treated as an empty block.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ProviderError::Configuration(format!("invalid provider block: {}", e)))
    }

    /// The configured backend name when it is not one the provider knows.
    pub fn unknown_backend(&self) -> Option<&str> {
        self.backend
            .as_deref()
            .filter(|name| Backend::from_name(name).is_none())
    }
}

/// Fully resolved provider configuration.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Address of the Cortex cluster.
    pub address: String,
    /// API key, used as basic auth password.
    pub api_key: String,
    /// Basic auth user.
    pub user: String,
    /// Tenant used when a resource does not name one.
    pub tenant_id: String,
    /// Backend type.
    pub backend: Backend,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("address", &self.address)
            .field("api_key", &crate::client::redacted(&self.api_key))
            .field("user", &crate::client::redacted(&self.user))
            .field("tenant_id", &self.tenant_id)
            .field("backend", &self.backend)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve against the process environment.
    pub fn resolve(raw: RawProviderConfig) -> Self {
        Self::resolve_with(raw, |name| std::env::var(name).ok())
    }

    /// Resolve using `env` to look up environment variables.
    ///
    /// Never fails. An unrecognized backend name behaves like `cortex`.
    pub fn resolve_with<F>(raw: RawProviderConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let field = |value: Option<String>, var: &str| -> String {
            value.or_else(|| env(var)).unwrap_or_default()
        };

        let backend = match raw.backend.as_deref() {
            None => Backend::default(),
            Some(name) => Backend::from_name(name).unwrap_or_else(|| {
                warn!(backend = %name, "Unrecognized backend, using cortex routes");
                Backend::Cortex
            }),
        };

        Self {
            address: field(raw.address, ENV_CORTEX_ADDRESS),
            api_key: field(raw.api_key, ENV_CORTEX_API_KEY),
            user: field(raw.user, ENV_CORTEX_USER),
            tenant_id: field(raw.tenant_id, ENV_CORTEX_TENANT_ID),
            backend,
        }
    }
}

/// Fill options missing from a provider block with their environment values.
///
/// Options already present (including explicit `null`s left by the host are
/// treated as absent) are kept. Non-object input is returned unchanged.
pub fn apply_env_defaults<F>(config: &Value, env: F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = config.clone();
    if config.is_null() {
        config = Value::Object(Default::default());
    }
    if let Value::Object(map) = &mut config {
        for (option, var) in ENV_DEFAULTS {
            let missing = map.get(option).map_or(true, Value::is_null);
            if missing {
                if let Some(value) = env(var) {
                    map.insert(option.to_string(), Value::String(value));
                }
            }
        }
    }
    config
}

/// Schema of the provider block.
pub fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "address",
            Attribute::required_string().with_description("Address of the Cortex cluster"),
        )
        .with_attribute(
            "api_key",
            Attribute::optional_string()
                .sensitive()
                .with_description("API key, used as basic auth password."),
        )
        .with_attribute(
            "user",
            Attribute::optional_string()
                .sensitive()
                .with_description("Used as basic auth user."),
        )
        .with_attribute(
            "tenant_id",
            Attribute::optional_string()
                .with_description("Tenant ID, passed as X-Scope-OrgID HTTP header."),
        )
        .with_attribute(
            "backend",
            Attribute::optional_string()
                .with_description("Backend type to interact with: <cortex|loki>")
                .with_default(Value::String(Backend::Cortex.as_str().to_string())),
        )
}
