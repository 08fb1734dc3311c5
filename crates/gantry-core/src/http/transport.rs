//! Transport abstraction and per-call transport selection
//!
//! The pipeline never talks to an HTTP client directly. It goes through
//! [`Transport`] instances produced by a [`TransportFactory`]. Default
//! transports are built once per distinct [`TransportSettings`] when an
//! action is registered and kept in a [`TransportCache`]; calls carrying a
//! timeout or hitting an endpoint with overrides get a fresh transport that
//! lives for that call only.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::http::error::TransportError;
use crate::http::timeout::{validate_timeout, TimeoutChain, TimeoutSource};
use crate::types::{Headers, RequestBody, TransportOverrides};
use crate::Result;

/// Transport-level settings beyond timeout and retries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Whether redirects are followed
    pub follow_redirects: bool,
    /// Redirect hop limit when following
    pub max_redirects: usize,
    /// Whether to validate TLS certificates
    pub validate_tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: None,
            follow_redirects: true,
            max_redirects: 5,
            validate_tls: true,
            user_agent: None,
        }
    }
}

/// Canonical key of a transport instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportSettings {
    pub timeout: Duration,
    pub retries: u32,
    pub config: TransportConfig,
}

impl TransportSettings {
    pub fn new(timeout: Duration, retries: u32, config: TransportConfig) -> Self {
        Self {
            timeout,
            retries,
            config,
        }
    }
}

/// Fully assembled outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    /// Serialized query string, without the leading `?`
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

impl OutboundRequest {
    /// URL with the query string appended
    pub fn full_url(&self) -> String {
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}{}", self.url, separator, query)
            }
            _ => self.url.clone(),
        }
    }
}

/// Successful upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub data: serde_json::Value,
}

/// Executes outbound requests
///
/// Implementations own connection handling, redirects and retries; the
/// first terminal outcome they return is final for the pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: OutboundRequest) -> std::result::Result<TransportResponse, TransportError>;
}

/// Builds transports for a given set of settings
pub trait TransportFactory: Send + Sync {
    fn build(&self, settings: &TransportSettings) -> Result<Arc<dyn Transport>>;
}

/// Transport picked for one call
#[derive(Clone)]
pub struct SelectedTransport {
    pub transport: Arc<dyn Transport>,
    pub settings: TransportSettings,
    pub timeout_source: TimeoutSource,
    /// Built for this call only
    pub per_call: bool,
}

impl std::fmt::Debug for SelectedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedTransport")
            .field("settings", &self.settings)
            .field("timeout_source", &self.timeout_source)
            .field("per_call", &self.per_call)
            .finish_non_exhaustive()
    }
}

/// Per-action transport inputs
#[derive(Debug, Clone)]
pub struct TransportPlan {
    /// Settings of the action's default transport
    pub defaults: TransportSettings,
    /// Timeout configured on the action itself
    pub action_timeout: Option<Duration>,
    /// Retries configured on the action itself
    pub action_retries: Option<u32>,
    /// Timeout used when neither call, action nor endpoint sets one
    pub fallback_timeout: Duration,
}

/// Default transports keyed by their settings
pub struct TransportCache {
    factory: Arc<dyn TransportFactory>,
    defaults: HashMap<TransportSettings, Arc<dyn Transport>>,
}

impl TransportCache {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            defaults: HashMap::new(),
        }
    }

    /// Build (or reuse) the default transport for `settings`; setup time only
    pub fn register(&mut self, settings: &TransportSettings) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self.defaults.get(settings) {
            return Ok(transport.clone());
        }
        validate_timeout(settings.timeout).map_err(|message| crate::Error::Configuration {
            message,
            source: None,
        })?;
        let transport = self.factory.build(settings)?;
        tracing::debug!(settings = ?settings, "registered default transport");
        self.defaults.insert(settings.clone(), transport.clone());
        Ok(transport)
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// Pick the transport for one call
    pub fn select(
        &self,
        plan: &TransportPlan,
        call_timeout: Option<Duration>,
        endpoint: Option<&TransportOverrides>,
    ) -> Result<SelectedTransport> {
        if call_timeout.is_none() && endpoint.is_none() {
            let transport = self
                .defaults
                .get(&plan.defaults)
                .cloned()
                .ok_or_else(|| crate::Error::Configuration {
                    message: "default transport was not registered for this action".to_string(),
                    source: None,
                })?;
            return Ok(SelectedTransport {
                transport,
                settings: plan.defaults.clone(),
                timeout_source: if plan.action_timeout.is_some() {
                    TimeoutSource::Action
                } else {
                    TimeoutSource::Default
                },
                per_call: false,
            });
        }

        let (timeout, timeout_source) = TimeoutChain::new(plan.fallback_timeout)
            .with_call(call_timeout)
            .with_action(plan.action_timeout)
            .with_endpoint(endpoint.and_then(TransportOverrides::timeout))
            .resolve();
        validate_timeout(timeout).map_err(|message| crate::Error::Configuration {
            message,
            source: None,
        })?;

        let retries = plan
            .action_retries
            .or_else(|| endpoint.and_then(|o| o.retries))
            .unwrap_or(plan.defaults.retries);
        let config = endpoint
            .and_then(|o| o.transport.clone())
            .unwrap_or_else(|| plan.defaults.config.clone());

        let settings = TransportSettings::new(timeout, retries, config);
        let transport = self.factory.build(&settings)?;

        Ok(SelectedTransport {
            transport,
            settings,
            timeout_source,
            per_call: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn request(&self, _request: OutboundRequest) -> std::result::Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status: 204,
                headers: Headers::new(),
                data: serde_json::Value::Null,
            })
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        built: Mutex<Vec<TransportSettings>>,
    }

    impl TransportFactory for RecordingFactory {
        fn build(&self, settings: &TransportSettings) -> Result<Arc<dyn Transport>> {
            self.built.lock().push(settings.clone());
            Ok(Arc::new(NullTransport))
        }
    }

    fn plan(action_timeout: Option<Duration>) -> TransportPlan {
        TransportPlan {
            defaults: TransportSettings::new(
                action_timeout.unwrap_or(Duration::from_secs(30)),
                0,
                TransportConfig::default(),
            ),
            action_timeout,
            action_retries: None,
            fallback_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_default_transport_is_shared() {
        let factory = Arc::new(RecordingFactory::default());
        let mut cache = TransportCache::new(factory.clone());
        let plan = plan(None);
        cache.register(&plan.defaults).unwrap();
        cache.register(&plan.defaults).unwrap();
        assert_eq!(cache.len(), 1);

        let selected = cache.select(&plan, None, None).unwrap();
        assert!(!selected.per_call);
        assert_eq!(factory.built.lock().len(), 1);
    }

    #[test]
    fn test_call_timeout_builds_fresh_transport() {
        let factory = Arc::new(RecordingFactory::default());
        let mut cache = TransportCache::new(factory.clone());
        let plan = plan(Some(Duration::from_secs(10)));
        cache.register(&plan.defaults).unwrap();

        let selected = cache
            .select(&plan, Some(Duration::from_secs(2)), None)
            .unwrap();
        assert!(selected.per_call);
        assert_eq!(selected.settings.timeout, Duration::from_secs(2));
        assert_eq!(selected.timeout_source, TimeoutSource::Call);
        // fresh transports are not cached
        assert_eq!(cache.len(), 1);
        assert_eq!(factory.built.lock().len(), 2);
    }

    #[test]
    fn test_action_timeout_beats_endpoint_timeout() {
        let factory = Arc::new(RecordingFactory::default());
        let mut cache = TransportCache::new(factory);
        let plan = plan(Some(Duration::from_secs(10)));
        cache.register(&plan.defaults).unwrap();

        let overrides = TransportOverrides {
            timeout_ms: Some(60_000),
            retries: Some(3),
            transport: None,
        };
        let selected = cache.select(&plan, None, Some(&overrides)).unwrap();
        assert!(selected.per_call);
        assert_eq!(selected.settings.timeout, Duration::from_secs(10));
        assert_eq!(selected.settings.retries, 3);
    }

    #[test]
    fn test_endpoint_timeout_beats_default() {
        let factory = Arc::new(RecordingFactory::default());
        let mut cache = TransportCache::new(factory);
        let plan = plan(None);
        cache.register(&plan.defaults).unwrap();

        let overrides = TransportOverrides {
            timeout_ms: Some(60_000),
            ..Default::default()
        };
        let selected = cache.select(&plan, None, Some(&overrides)).unwrap();
        assert_eq!(selected.settings.timeout, Duration::from_secs(60));
        assert_eq!(selected.timeout_source, TimeoutSource::Endpoint);
    }

    #[test]
    fn test_unregistered_default_is_config_error() {
        let cache = TransportCache::new(Arc::new(RecordingFactory::default()));
        let err = cache.select(&plan(None), None, None).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_full_url_appends_query() {
        let request = OutboundRequest {
            method: Method::GET,
            url: "https://api.example.com/users".to_string(),
            query: Some("page=2".to_string()),
            headers: BTreeMap::new(),
            body: None,
        };
        assert_eq!(request.full_url(), "https://api.example.com/users?page=2");
    }
}
