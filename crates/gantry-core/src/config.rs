//! Configuration management
//!
//! This module handles:
//! - Gateway-wide settings (defaults, version, language)
//! - Configuration files (YAML/JSON)
//! - Environment variable overrides, with `.env` support
//! - Declarative service and action definitions

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::action::{ActionConfig, EndpointSelector, ProxyHeaders, ServiceConfig};
use crate::http::TransportConfig;
use crate::logging::LoggingConfig;
use crate::types::EndpointTable;
use crate::{Error, Result};

/// Gateway-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Language used when the caller sends no `accept-language`
    pub default_language: String,

    /// Value of the `x-gateway-version` header
    pub gateway_version: String,

    /// Timeout in milliseconds for actions that set none
    pub default_timeout_ms: u64,

    /// Retries for actions that set none
    pub default_retries: u32,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// User agent of outbound requests
    pub user_agent: Option<String>,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            gateway_version: crate::VERSION.to_string(),
            default_timeout_ms: 30_000,
            default_retries: 0,
            connect_timeout_ms: None,
            user_agent: Some(format!("gantry/{}", crate::VERSION)),
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewaySettings {
    /// Load settings from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        load_file(path)
    }

    /// Apply `GANTRY_*` environment variables, reading `.env` first when present
    pub fn with_env_overrides(mut self) -> Result<Self> {
        dotenv::dotenv().ok();

        if let Ok(language) = std::env::var("GANTRY_DEFAULT_LANGUAGE") {
            self.default_language = language;
        }
        if let Ok(version) = std::env::var("GANTRY_GATEWAY_VERSION") {
            self.gateway_version = version;
        }
        if let Some(timeout) = env_parse::<u64>("GANTRY_DEFAULT_TIMEOUT_MS")? {
            self.default_timeout_ms = timeout;
        }
        if let Some(retries) = env_parse::<u32>("GANTRY_DEFAULT_RETRIES")? {
            self.default_retries = retries;
        }
        if let Some(timeout) = env_parse::<u64>("GANTRY_CONNECT_TIMEOUT_MS")? {
            self.connect_timeout_ms = Some(timeout);
        }
        if let Ok(user_agent) = std::env::var("GANTRY_USER_AGENT") {
            self.user_agent = Some(user_agent);
        }
        self.logging.merge_with_env();

        Ok(self)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Base transport config; per-action settings start from this
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            user_agent: self.user_agent.clone(),
            ..TransportConfig::default()
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| Error::Configuration {
            message: format!("Invalid value for {}: {}", name, e),
            source: None,
        }),
        Err(_) => Ok(None),
    }
}

/// Read a YAML (`.yaml`/`.yml`) or JSON file
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;

    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| Error::Configuration {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(anyhow::Error::new(e)),
        })
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Declarative description of a service and its actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub endpoints: EndpointTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Inbound headers forwarded to every action of the service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forward_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

/// Declarative description of one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    /// Named endpoint entry; the table's default entry when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default)]
    pub idempotent: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forward_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ServiceDefinition {
    pub fn from_file(path: &Path) -> Result<Self> {
        load_file(path)
    }

    /// Service configuration; hooks are attached afterwards with builder methods
    pub fn service_config(&self) -> ServiceConfig {
        let mut service = ServiceConfig::new(self.name.clone(), self.endpoints.clone());
        if let Some(schema) = &self.schema {
            service = service.with_schema(schema.clone());
        }
        if !self.forward_headers.is_empty() {
            service = service.with_proxy_headers(ProxyHeaders::forward(self.forward_headers.clone()));
        }
        if let Some(timeout_ms) = self.timeout_ms {
            service = service.with_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(retries) = self.retries {
            service = service.with_retries(retries);
        }
        service
    }

    /// Action configurations, in definition order
    pub fn action_configs(&self, settings: &GatewaySettings) -> Result<Vec<ActionConfig>> {
        self.actions
            .iter()
            .map(|action| action.action_config(settings))
            .collect()
    }
}

impl ActionDefinition {
    pub fn action_config(&self, settings: &GatewaySettings) -> Result<ActionConfig> {
        let method = Method::from_str(&self.method.to_uppercase()).map_err(|e| {
            Error::Configuration {
                message: format!("Unsupported HTTP method '{}' for action '{}'", self.method, self.name),
                source: Some(anyhow::Error::new(e)),
            }
        })?;

        let mut action = ActionConfig::new(self.name.clone(), method, self.path.as_str())
            .idempotent(self.idempotent)
            .with_transport(
                self.transport
                    .clone()
                    .unwrap_or_else(|| settings.transport_config()),
            );

        if let Some(endpoint) = &self.endpoint {
            action = action.with_endpoint(EndpointSelector::Named(endpoint.clone()));
        }
        if let Some(schema) = &self.schema {
            action = action.with_schema(schema.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            action = action.with_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(retries) = self.retries {
            action = action.with_retries(retries);
        }
        if !self.forward_headers.is_empty() {
            action = action.with_proxy_headers(ProxyHeaders::forward(self.forward_headers.clone()));
        }

        Ok(action)
    }
}
