//! Request body and query assembly
//!
//! Runs the action's params producer, serializes the query string and
//! prepares the body preview reported in debug headers. Every step here is
//! optional: a failing producer or serializer is logged and the request is
//! sent without the missing part.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};

use crate::action::{ActionConfig, HookScope, QuerySerializer, RequestParams};
use crate::error::recoverable;
use crate::http::headers::ComposedHeaders;
use crate::types::{Headers, RequestBody};

/// Body previews are only reported below this many characters
pub const DEBUG_BODY_LIMIT: usize = 256;

/// Preview reported for binary bodies
pub const BINARY_PREVIEW: &str = "[binary]";

/// Same set as JavaScript's `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Body, query and final headers of an outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    pub headers: Headers,
    pub query: Option<String>,
    pub body: Option<RequestBody>,
    /// Encoded body, present only when shorter than [`DEBUG_BODY_LIMIT`]
    pub body_preview: Option<String>,
}

impl BuiltRequest {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Assembles body and query for one action
#[derive(Debug, Clone, Copy)]
pub struct RequestAssembler<'a> {
    action: &'a ActionConfig,
}

impl<'a> RequestAssembler<'a> {
    pub fn new(action: &'a ActionConfig) -> Self {
        Self { action }
    }

    pub async fn build(&self, composed: ComposedHeaders, scope: &HookScope<'_>) -> BuiltRequest {
        let ComposedHeaders {
            mut headers,
            auth_names,
            ..
        } = composed;

        let params = match &self.action.params {
            Some(producer) => recoverable(
                scope.ctx,
                "params",
                producer.produce(scope.args, &headers, scope).await,
                RequestParams::default,
            ),
            None => RequestParams::default(),
        };

        if let Some(overrides) = &params.headers {
            for name in overrides.names() {
                if auth_names.contains(name) {
                    continue;
                }
                match overrides.get(name) {
                    Some(value) => headers.set(name, value),
                    None => headers.unset(name),
                }
            }
        }

        if let Some(body) = &params.body {
            headers.set_if_absent("content-type", body.content_type());
        }

        let query = params.query.as_ref().and_then(|query| {
            recoverable(
                scope.ctx,
                "query_serializer",
                serialize_query(query, self.action.query_serializer.as_ref()).map(Some),
                || None,
            )
        });

        let body_preview = params.body.as_ref().and_then(|body| {
            recoverable(scope.ctx, "body_preview", preview_body(body), || None)
        });

        BuiltRequest {
            headers: Headers::from_pairs(headers.prune()),
            query: query.filter(|q| !q.is_empty()),
            body: params.body,
            body_preview,
        }
    }
}

/// Serialize a query map, with the custom serializer when one is set
pub fn serialize_query(
    query: &Map<String, Value>,
    serializer: Option<&QuerySerializer>,
) -> anyhow::Result<String> {
    if let Some(serializer) = serializer {
        return serializer.serialize(query);
    }

    let mut pairs: Vec<(&str, String)> = Vec::with_capacity(query.len());
    for (key, value) in query {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(item) = scalar_to_string(item) {
                        pairs.push((key.as_str(), item));
                    }
                }
            }
            other => {
                if let Some(value) = scalar_to_string(other) {
                    pairs.push((key.as_str(), value));
                }
            }
        }
    }

    Ok(serde_urlencoded::to_string(&pairs)?)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

/// Encoded body preview, `None` when it reaches [`DEBUG_BODY_LIMIT`]
///
/// Only an encoding failure is an error; an oversized body simply has no
/// preview.
pub fn preview_body(body: &RequestBody) -> anyhow::Result<Option<String>> {
    let encoded = match body {
        RequestBody::Binary(_) => BINARY_PREVIEW.to_string(),
        RequestBody::Json(value) => {
            let text = serde_json::to_string(value)?;
            utf8_percent_encode(&text, COMPONENT).to_string()
        }
        RequestBody::Text(text) => text.clone(),
    };
    if encoded.chars().count() < DEBUG_BODY_LIMIT {
        Ok(Some(encoded))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::HookResult;
    use crate::context::{TraceContext, TracingContext};
    use bytes::Bytes;
    use reqwest::Method;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn composed(auth_names: &[&str]) -> ComposedHeaders {
        ComposedHeaders {
            headers: Headers::from_pairs([("accept", "application/json"), ("authorization", "Bearer t")]),
            auth_names: auth_names.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            language: "en".to_string(),
        }
    }

    async fn build(action: &ActionConfig, args: &Value, auth_names: &[&str]) -> BuiltRequest {
        let ctx = TracingContext::root("test");
        let scope = HookScope {
            args,
            ctx: ctx.as_ref() as &dyn TraceContext,
            response_headers: None,
        };
        RequestAssembler::new(action).build(composed(auth_names), &scope).await
    }

    fn with_params<F>(f: F) -> ActionConfig
    where
        F: Fn(&Value, &Headers) -> HookResult<RequestParams> + Send + Sync + 'static,
    {
        ActionConfig::new("create", Method::POST, "/users").with_params(Arc::new(f))
    }

    #[tokio::test]
    async fn test_no_producer_means_no_body() {
        let action = ActionConfig::new("list", Method::GET, "/users");
        let built = build(&action, &json!({}), &[]).await;
        assert!(built.body.is_none());
        assert!(built.query.is_none());
        assert!(built.body_preview.is_none());
        assert!(built.content_type().is_none());
    }

    #[tokio::test]
    async fn test_json_body_and_query() {
        let action = with_params(|args, _| {
            let mut query = Map::new();
            query.insert("page".into(), json!(2));
            query.insert("tag".into(), json!(["a", "b"]));
            Ok(RequestParams {
                body: Some(RequestBody::Json(json!({"name": args["name"]}))),
                query: Some(query),
                headers: None,
            })
        });
        let built = build(&action, &json!({"name": "Ada"}), &[]).await;

        assert_eq!(built.query.as_deref(), Some("page=2&tag=a&tag=b"));
        assert_eq!(built.content_type(), Some("application/json"));
        assert_eq!(
            built.body_preview.as_deref(),
            Some("%7B%22name%22%3A%22Ada%22%7D")
        );
    }

    #[tokio::test]
    async fn test_failing_producer_is_recovered() {
        let action = with_params(|_, _| anyhow::bail!("bad args"));
        let built = build(&action, &json!({}), &[]).await;
        assert!(built.body.is_none());
        assert!(built.query.is_none());
        assert_eq!(built.headers.get("accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_producer_headers_cannot_replace_auth() {
        let action = with_params(|_, _| {
            Ok(RequestParams {
                headers: Some(Headers::from_pairs([
                    ("authorization", "forged"),
                    ("x-extra", "1"),
                ])),
                ..Default::default()
            })
        });
        let built = build(&action, &json!({}), &["authorization"]).await;
        assert_eq!(built.headers.get("authorization"), Some("Bearer t"));
        assert_eq!(built.headers.get("x-extra"), Some("1"));
    }

    #[test]
    fn test_binary_preview() {
        let body = RequestBody::Binary(Bytes::from_static(b"\x00\x01"));
        assert_eq!(preview_body(&body).unwrap().as_deref(), Some(BINARY_PREVIEW));
    }

    #[test]
    fn test_preview_limit_is_exclusive() {
        let just_under = RequestBody::Text("x".repeat(DEBUG_BODY_LIMIT - 1));
        assert!(preview_body(&just_under).unwrap().is_some());

        let at_limit = RequestBody::Text("x".repeat(DEBUG_BODY_LIMIT));
        assert_eq!(preview_body(&at_limit).unwrap(), None);
    }

    #[test]
    fn test_nested_query_values_are_json_encoded() {
        let mut query = Map::new();
        query.insert("filter".into(), json!({"a": 1}));
        query.insert("skip".into(), Value::Null);
        assert_eq!(
            serialize_query(&query, None).unwrap(),
            "filter=%7B%22a%22%3A1%7D"
        );
    }

    #[test]
    fn test_custom_serializer_wins() {
        let serializer = QuerySerializer::function(|_| "raw=1".to_string());
        let mut query = Map::new();
        query.insert("page".into(), json!(2));
        assert_eq!(serialize_query(&query, Some(&serializer)).unwrap(), "raw=1");
    }
}
