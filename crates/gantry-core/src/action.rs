//! Action and service configuration
//!
//! An [`ActionConfig`] describes one gateway endpoint: method, path,
//! endpoint selection, validation schema, transport settings and the
//! optional hooks that customize each pipeline stage. Values that may be
//! either static or computed per call are modelled as enums with an
//! explicit `Computed` variant.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::TraceContext;
use crate::http::{ErrorResponse, TransportConfig};
use crate::telemetry::StatsSink;
use crate::types::{EndpointEntry, EndpointTable, Headers, ParsedError, RequestBody};

/// Action type reported to auth providers and header injectors
pub const ACTION_TYPE_REST: &str = "rest";

/// Result type returned by user hooks
pub type HookResult<T> = anyhow::Result<T>;

/// Request path, static template or computed from the call arguments
#[derive(Clone)]
pub enum PathSpec {
    /// Path template; `{name}` placeholders are filled from the call arguments
    Static(String),
    Computed(Arc<dyn Fn(&Value) -> String + Send + Sync>),
}

impl PathSpec {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        PathSpec::Computed(Arc::new(f))
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        PathSpec::Static(path.to_string())
    }
}

/// Computed endpoint selector signature
pub type EndpointFn = dyn Fn(&EndpointTable, &Value) -> Option<EndpointEntry> + Send + Sync;

/// How an action picks its endpoint entry
#[derive(Clone, Default)]
pub enum EndpointSelector {
    /// Use the table's `default` entry
    #[default]
    Default,
    /// Look up a named entry
    Named(String),
    /// Compute the entry from the table and the call arguments
    Computed(Arc<EndpointFn>),
}

impl EndpointSelector {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&EndpointTable, &Value) -> Option<EndpointEntry> + Send + Sync + 'static,
    {
        EndpointSelector::Computed(Arc::new(f))
    }

    /// Label used in logs and errors
    pub fn describe(&self) -> String {
        match self {
            EndpointSelector::Default => "default".to_string(),
            EndpointSelector::Named(name) => name.clone(),
            EndpointSelector::Computed(_) => "<computed>".to_string(),
        }
    }
}

/// Header injection hook: `(inbound headers, action type) -> partial headers`
pub trait HeaderInjector: Send + Sync {
    fn inject(&self, inbound: &Headers, action_type: &str) -> Headers;
}

impl<F> HeaderInjector for F
where
    F: Fn(&Headers, &str) -> Headers + Send + Sync,
{
    fn inject(&self, inbound: &Headers, action_type: &str) -> Headers {
        self(inbound, action_type)
    }
}

/// Proxy header configuration at service or action level
#[derive(Clone)]
pub enum ProxyHeaders {
    /// Merge the injector's output directly
    Inject(Arc<dyn HeaderInjector>),
    /// Copy these inbound headers when not already set
    Forward(Vec<String>),
}

impl ProxyHeaders {
    pub fn inject<F>(f: F) -> Self
    where
        F: Fn(&Headers, &str) -> Headers + Send + Sync + 'static,
    {
        ProxyHeaders::Inject(Arc::new(f))
    }

    pub fn forward<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProxyHeaders::Forward(names.into_iter().map(Into::into).collect())
    }
}

/// Parameters handed to an auth provider
pub struct AuthParams<'a> {
    pub action_type: &'static str,
    pub service_name: &'a str,
    pub inbound_headers: &'a Headers,
    pub auth_args: &'a Value,
}

/// Produces authentication headers for an outbound call
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn auth_headers(&self, params: &AuthParams<'_>) -> HookResult<Headers>;
}

/// Context passed to the params producer and the transform hooks
pub struct HookScope<'a> {
    pub args: &'a Value,
    pub ctx: &'a dyn TraceContext,
    /// Upstream response headers, when a response exists
    pub response_headers: Option<&'a Headers>,
}

/// Output of a params producer
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub body: Option<RequestBody>,
    pub query: Option<Map<String, Value>>,
    pub headers: Option<Headers>,
}

/// Builds the request body, query and extra headers from the call
#[async_trait]
pub trait ParamsProducer: Send + Sync {
    async fn produce(
        &self,
        args: &Value,
        headers: &Headers,
        scope: &HookScope<'_>,
    ) -> HookResult<RequestParams>;
}

#[async_trait]
impl<F> ParamsProducer for F
where
    F: Fn(&Value, &Headers) -> HookResult<RequestParams> + Send + Sync,
{
    async fn produce(
        &self,
        args: &Value,
        headers: &Headers,
        _scope: &HookScope<'_>,
    ) -> HookResult<RequestParams> {
        self(args, headers)
    }
}

/// Rewrites a successful response payload
#[async_trait]
pub trait ResponseTransform: Send + Sync {
    async fn transform(&self, data: Value, scope: &HookScope<'_>) -> HookResult<Value>;
}

#[async_trait]
impl<F> ResponseTransform for F
where
    F: Fn(Value) -> HookResult<Value> + Send + Sync,
{
    async fn transform(&self, data: Value, _scope: &HookScope<'_>) -> HookResult<Value> {
        self(data)
    }
}

/// Maps an upstream error response to a normalized error
#[async_trait]
pub trait ErrorTransform: Send + Sync {
    async fn transform(
        &self,
        response: &ErrorResponse,
        scope: &HookScope<'_>,
    ) -> HookResult<Option<ParsedError>>;
}

#[async_trait]
impl<F> ErrorTransform for F
where
    F: Fn(&ErrorResponse) -> HookResult<Option<ParsedError>> + Send + Sync,
{
    async fn transform(
        &self,
        response: &ErrorResponse,
        _scope: &HookScope<'_>,
    ) -> HookResult<Option<ParsedError>> {
        self(response)
    }
}

/// Object-form query serializer
pub trait SerializeQuery: Send + Sync {
    fn serialize(&self, query: &Map<String, Value>) -> HookResult<String>;
}

/// Custom query serialization
#[derive(Clone)]
pub enum QuerySerializer {
    Function(Arc<dyn Fn(&Map<String, Value>) -> String + Send + Sync>),
    Object(Arc<dyn SerializeQuery>),
}

impl QuerySerializer {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> String + Send + Sync + 'static,
    {
        QuerySerializer::Function(Arc::new(f))
    }

    pub fn serialize(&self, query: &Map<String, Value>) -> HookResult<String> {
        match self {
            QuerySerializer::Function(f) => Ok(f(query)),
            QuerySerializer::Object(serializer) => serializer.serialize(query),
        }
    }
}

/// Service-level configuration shared by its actions
#[derive(Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub endpoints: EndpointTable,
    pub schema: Option<Value>,
    pub proxy_headers: Option<ProxyHeaders>,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub stats_sink: Option<Arc<dyn StatsSink>>,
    /// Default timeout for actions that set none
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, endpoints: EndpointTable) -> Self {
        Self {
            name: name.into(),
            endpoints,
            schema: None,
            proxy_headers: None,
            auth: None,
            stats_sink: None,
            timeout: None,
            retries: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_proxy_headers(mut self, proxy_headers: ProxyHeaders) -> Self {
        self.proxy_headers = Some(proxy_headers);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(sink);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// Immutable configuration of one gateway action
#[derive(Clone)]
pub struct ActionConfig {
    pub name: String,
    pub method: Method,
    pub path: PathSpec,
    pub endpoint: EndpointSelector,
    pub schema: Option<Value>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub transport: TransportConfig,
    pub idempotent: bool,
    pub proxy_headers: Option<ProxyHeaders>,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub params: Option<Arc<dyn ParamsProducer>>,
    pub response_transform: Option<Arc<dyn ResponseTransform>>,
    pub error_transform: Option<Arc<dyn ErrorTransform>>,
    pub query_serializer: Option<QuerySerializer>,
}

impl ActionConfig {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<PathSpec>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            endpoint: EndpointSelector::Default,
            schema: None,
            timeout: None,
            retries: None,
            transport: TransportConfig::default(),
            idempotent: false,
            proxy_headers: None,
            auth: None,
            params: None,
            response_transform: None,
            error_transform: None,
            query_serializer: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointSelector) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn with_proxy_headers(mut self, proxy_headers: ProxyHeaders) -> Self {
        self.proxy_headers = Some(proxy_headers);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_params(mut self, params: Arc<dyn ParamsProducer>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_response_transform(mut self, transform: Arc<dyn ResponseTransform>) -> Self {
        self.response_transform = Some(transform);
        self
    }

    pub fn with_error_transform(mut self, transform: Arc<dyn ErrorTransform>) -> Self {
        self.error_transform = Some(transform);
        self
    }

    pub fn with_query_serializer(mut self, serializer: QuerySerializer) -> Self {
        self.query_serializer = Some(serializer);
        self
    }

    /// Action schema, falling back to the service schema
    pub fn effective_schema<'a>(&'a self, service: &'a ServiceConfig) -> Option<&'a Value> {
        self.schema.as_ref().or(service.schema.as_ref())
    }

    /// Action auth provider, falling back to the service provider
    pub fn effective_auth<'a>(&'a self, service: &'a ServiceConfig) -> Option<&'a Arc<dyn AuthProvider>> {
        self.auth.as_ref().or(service.auth.as_ref())
    }
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("endpoint", &self.endpoint.describe())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("transport", &self.transport)
            .field("idempotent", &self.idempotent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_schema_falls_back_to_service() {
        let service = ServiceConfig::new("users", EndpointTable::new())
            .with_schema(json!({"type": "object"}));
        let action = ActionConfig::new("get", Method::GET, "/users");
        assert_eq!(action.effective_schema(&service), Some(&json!({"type": "object"})));

        let action = action.with_schema(json!({"type": "array"}));
        assert_eq!(action.effective_schema(&service), Some(&json!({"type": "array"})));
    }

    #[test]
    fn test_selector_description() {
        assert_eq!(EndpointSelector::Default.describe(), "default");
        assert_eq!(EndpointSelector::Named("eu".into()).describe(), "eu");
        assert_eq!(
            EndpointSelector::computed(|_, _| None).describe(),
            "<computed>"
        );
    }

    #[test]
    fn test_query_serializer_function_form() {
        let serializer = QuerySerializer::function(|query| {
            query.keys().cloned().collect::<Vec<_>>().join(";")
        });
        let mut query = Map::new();
        query.insert("a".into(), json!(1));
        query.insert("b".into(), json!(2));
        assert_eq!(serializer.serialize(&query).unwrap(), "a;b");
    }
}
