use serde::{Deserialize, Serialize};

use crate::error::ToolError;

pub const ENV_TENANT_ID: &str = "MS_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "MS_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "MS_CLIENT_SECRET";
pub const ENV_GRAPH_VERSION: &str = "M365_GRAPH_VERSION";
pub const ENV_GRAPH_BASE_URL: &str = "M365_GRAPH_BASE_URL";
pub const ENV_AZURE_BASE_URL: &str = "M365_AZURE_BASE_URL";
pub const ENV_AUTHORITY_HOST: &str = "M365_AUTHORITY_HOST";

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com";
pub const DEFAULT_AZURE_BASE_URL: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Graph API version segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub enum GraphVersion {
    #[default]
    #[serde(rename = "v1.0")]
    V1,
    #[serde(rename = "beta")]
    Beta,
}

impl GraphVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphVersion::V1 => "v1.0",
            GraphVersion::Beta => "beta",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "v1.0" | "v1" => Some(GraphVersion::V1),
            "beta" => Some(GraphVersion::Beta),
            _ => None,
        }
    }
}

/// Upstream hosts. Overridable for sovereign clouds and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub graph_base: String,
    pub azure_base: String,
    pub authority_host: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            graph_base: DEFAULT_GRAPH_BASE_URL.to_string(),
            azure_base: DEFAULT_AZURE_BASE_URL.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every upstream at a single host (used with local mock servers).
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            graph_base: base.clone(),
            azure_base: base.clone(),
            authority_host: base,
        }
    }
}

/// App registration used for the client-credentials grant.
#[derive(Clone)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub graph_version: GraphVersion,
}

impl Settings {
    pub fn from_env() -> Result<Self, ToolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; missing required values are fatal.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ToolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ToolError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ToolError::Config(format!("{} is not set", key)))
        };

        let credentials = Credentials {
            tenant_id: required(ENV_TENANT_ID)?,
            client_id: required(ENV_CLIENT_ID)?,
            client_secret: required(ENV_CLIENT_SECRET)?,
        };

        let graph_version = match lookup(ENV_GRAPH_VERSION) {
            Some(v) => GraphVersion::parse(&v).ok_or_else(|| {
                ToolError::Config(format!(
                    "{} must be 'v1.0' or 'beta', got '{}'",
                    ENV_GRAPH_VERSION, v
                ))
            })?,
            None => GraphVersion::V1,
        };

        let defaults = Endpoints::default();
        let endpoint = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        let endpoints = Endpoints {
            graph_base: endpoint(ENV_GRAPH_BASE_URL, defaults.graph_base),
            azure_base: endpoint(ENV_AZURE_BASE_URL, defaults.azure_base),
            authority_host: endpoint(ENV_AUTHORITY_HOST, defaults.authority_host),
        };

        Ok(Self {
            credentials,
            endpoints,
            graph_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |k| map.get(k).map(|v| v.to_string())
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let env = HashMap::from([(ENV_TENANT_ID, "t"), (ENV_CLIENT_ID, "c")]);
        let err = Settings::from_lookup(lookup(env)).unwrap_err();
        assert!(matches!(err, ToolError::Config(ref m) if m.contains(ENV_CLIENT_SECRET)));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let env = HashMap::from([
            (ENV_TENANT_ID, "  "),
            (ENV_CLIENT_ID, "c"),
            (ENV_CLIENT_SECRET, "s"),
        ]);
        assert!(Settings::from_lookup(lookup(env)).is_err());
    }

    #[test]
    fn defaults_and_overrides() {
        let env = HashMap::from([
            (ENV_TENANT_ID, "t"),
            (ENV_CLIENT_ID, "c"),
            (ENV_CLIENT_SECRET, "s"),
            (ENV_GRAPH_VERSION, "beta"),
            (ENV_GRAPH_BASE_URL, "https://graph.microsoft.us/"),
        ]);
        let settings = Settings::from_lookup(lookup(env)).unwrap();
        assert_eq!(settings.graph_version, GraphVersion::Beta);
        assert_eq!(settings.endpoints.graph_base, "https://graph.microsoft.us");
        assert_eq!(settings.endpoints.azure_base, DEFAULT_AZURE_BASE_URL);
        assert!(!format!("{:?}", settings.credentials).contains("\"s\""));
    }

    #[test]
    fn rejects_unknown_graph_version() {
        let env = HashMap::from([
            (ENV_TENANT_ID, "t"),
            (ENV_CLIENT_ID, "c"),
            (ENV_CLIENT_SECRET, "s"),
            (ENV_GRAPH_VERSION, "v2"),
        ]);
        assert!(Settings::from_lookup(lookup(env)).is_err());
    }
}
