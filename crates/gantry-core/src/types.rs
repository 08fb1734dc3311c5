//! Core types and data structures for the Gantry dispatch pipeline
//!
//! This module defines the data model shared by every pipeline stage:
//! endpoint tables, per-call invocations, header sets, debug headers,
//! normalized errors and stats records.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::context::TraceContext;
use crate::http::TransportConfig;

/// Name of the endpoint entry used when an action names no endpoint
pub const DEFAULT_ENDPOINT: &str = "default";

/// Transport overrides attached to an endpoint entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOverrides {
    /// Request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Retry count handed to the transport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Transport-level settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,
}

impl TransportOverrides {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn is_empty(&self) -> bool {
        self.timeout_ms.is_none() && self.retries.is_none() && self.transport.is_none()
    }
}

/// One entry of a service's endpoint table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointEntry {
    /// Plain base URL
    Url(String),
    /// Base URL carrying its own transport overrides
    Extended {
        url: String,
        #[serde(flatten)]
        overrides: TransportOverrides,
    },
}

impl EndpointEntry {
    pub fn url(&self) -> &str {
        match self {
            EndpointEntry::Url(url) => url,
            EndpointEntry::Extended { url, .. } => url,
        }
    }

    /// Overrides carried by the entry, if any
    pub fn overrides(&self) -> Option<&TransportOverrides> {
        match self {
            EndpointEntry::Url(_) => None,
            EndpointEntry::Extended { overrides, .. } if !overrides.is_empty() => Some(overrides),
            EndpointEntry::Extended { .. } => None,
        }
    }
}

impl From<&str> for EndpointEntry {
    fn from(url: &str) -> Self {
        EndpointEntry::Url(url.to_string())
    }
}

/// Mapping from logical endpoint name to endpoint entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointTable(HashMap<String, EndpointEntry>);

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, returning the table for chaining
    pub fn with(mut self, name: impl Into<String>, entry: impl Into<EndpointEntry>) -> Self {
        self.0.insert(name.into(), entry.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: impl Into<EndpointEntry>) {
        self.0.insert(name.into(), entry.into());
    }

    pub fn get(&self, name: &str) -> Option<&EndpointEntry> {
        self.0.get(name)
    }

    /// The `default` entry
    pub fn default_entry(&self) -> Option<&EndpointEntry> {
        self.0.get(DEFAULT_ENDPOINT)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Header set keyed by lower-cased name; `None` marks an absent value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Option<String>>",
    into = "BTreeMap<String, Option<String>>"
)]
pub struct Headers(BTreeMap<String, Option<String>>);

impl From<BTreeMap<String, Option<String>>> for Headers {
    fn from(map: BTreeMap<String, Option<String>>) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            match value {
                Some(value) => headers.set(&name, value),
                None => headers.unset(&name),
            }
        }
        headers
    }
}

impl From<Headers> for BTreeMap<String, Option<String>> {
    fn from(headers: Headers) -> Self {
        headers.0
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from name/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.set(name.as_ref(), value);
        }
        headers
    }

    /// Set a header, replacing any previous value
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), Some(value.into()));
    }

    /// Explicitly mark a header as absent
    pub fn unset(&mut self, name: &str) {
        self.0.insert(name.to_ascii_lowercase(), None);
    }

    /// Set a header only if it carries no value yet
    pub fn set_if_absent(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.set(name, value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|value| value.as_deref())
    }

    /// Whether the header is present with a value
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Merge another header set over this one; absent markers are carried over
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in &other.0 {
            self.0.insert(name.to_ascii_lowercase(), value.clone());
        }
    }

    /// Names carried by this set, including absent markers
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Present name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (name.as_str(), v)))
    }

    /// Drop absent entries, producing the transmitted header map
    pub fn prune(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outbound request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document
    Json(Value),
    /// Plain text
    Text(String),
    /// Opaque bytes
    Binary(Bytes),
}

impl RequestBody {
    /// Content type matching the body kind
    pub fn content_type(&self) -> &'static str {
        match self {
            RequestBody::Json(_) => "application/json",
            RequestBody::Text(_) => "text/plain; charset=utf-8",
            RequestBody::Binary(_) => "application/octet-stream",
        }
    }
}

/// Per-call input to the dispatch pipeline
#[derive(Clone)]
pub struct CallInvocation {
    /// Call arguments
    pub args: Value,
    /// Request id correlating logs, telemetry and errors
    pub request_id: Option<String>,
    /// Inbound headers
    pub headers: Headers,
    /// Parent tracing context
    pub ctx: Arc<dyn TraceContext>,
    /// Arguments forwarded to the auth provider
    pub auth_args: Value,
    /// Per-call timeout override
    pub timeout: Option<Duration>,
}

impl CallInvocation {
    pub fn new(args: Value, ctx: Arc<dyn TraceContext>) -> Self {
        Self {
            args,
            request_id: None,
            headers: Headers::new(),
            ctx,
            auth_args: Value::Null,
            timeout: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_auth_args(mut self, auth_args: Value) -> Self {
        self.auth_args = auth_args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for CallInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallInvocation")
            .field("args", &self.args)
            .field("request_id", &self.request_id)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Diagnostic-only header set, independent of the transmitted headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DebugHeaders {
    pub method: String,
    pub url: String,
    /// Encoded body preview, only when shorter than the preview limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Canonical error shape produced by a transform hook or the fallback parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ParsedError {
    pub fn new(status: Option<u16>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Error returned to the caller of a dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayError {
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Per-dispatch telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub request_method: String,
    pub request_url: String,
    /// Elapsed upstream time in milliseconds
    pub request_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<usize>,
    pub status: u16,
}
