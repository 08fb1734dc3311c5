//! Built-in auth providers
//!
//! Supports:
//! - Static header sets with `${ENV:VAR}` expansion
//! - Bearer tokens, from a literal or an environment variable
//!
//! Anything more involved (token issuance, refresh) is the job of a custom
//! [`AuthProvider`].

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::action::{AuthParams, AuthProvider, HookResult};
use crate::types::Headers;

static ENV_REGEX: OnceLock<Regex> = OnceLock::new();

fn env_regex() -> &'static Regex {
    ENV_REGEX.get_or_init(|| Regex::new(r"\$\{ENV:([^}]+)\}").expect("Valid regex pattern"))
}

/// Expand `${ENV:VAR}` references in a header value
pub fn expand_env_vars(value: &str) -> HookResult<String> {
    let mut result = value.to_string();

    for cap in env_regex().captures_iter(value) {
        let var_name = &cap[1];
        let env_value = std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable {} not found", var_name))?;
        result = result.replace(&cap[0], &env_value);
    }

    Ok(result)
}

/// Fixed header set, values expanded from the environment on every call
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    headers: BTreeMap<String, String>,
}

impl StaticAuth {
    pub fn new<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    /// Check that every referenced variable is set
    pub fn validate_credentials(&self) -> HookResult<()> {
        for value in self.headers.values() {
            expand_env_vars(value)?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn auth_headers(&self, _params: &AuthParams<'_>) -> HookResult<Headers> {
        let mut headers = Headers::new();
        for (name, value) in &self.headers {
            headers.set(name, expand_env_vars(value)?);
        }
        Ok(headers)
    }
}

/// Where a bearer token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenSource {
    Literal(String),
    Env(String),
}

/// `authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: TokenSource,
}

impl BearerAuth {
    /// Create with an explicit token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: TokenSource::Literal(token.into()),
        }
    }

    /// Read the token from `var` at call time
    pub fn from_env(var: impl Into<String>) -> Self {
        Self {
            token: TokenSource::Env(var.into()),
        }
    }

    fn token(&self) -> HookResult<String> {
        match &self.token {
            TokenSource::Literal(token) => Ok(token.clone()),
            TokenSource::Env(var) => std::env::var(var)
                .map_err(|_| anyhow::anyhow!("Bearer token not found. Set {} environment variable", var)),
        }
    }
}

#[async_trait]
impl AuthProvider for BearerAuth {
    async fn auth_headers(&self, _params: &AuthParams<'_>) -> HookResult<Headers> {
        let token = self.token()?;
        if token.trim().is_empty() {
            anyhow::bail!("Bearer token is empty");
        }
        let mut headers = Headers::new();
        headers.set("authorization", format!("Bearer {}", token));
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ACTION_TYPE_REST;
    use serde_json::Value;

    fn params(inbound: &Headers) -> AuthParams<'_> {
        AuthParams {
            action_type: ACTION_TYPE_REST,
            service_name: "users",
            inbound_headers: inbound,
            auth_args: &Value::Null,
        }
    }

    #[tokio::test]
    async fn test_bearer_auth() {
        let inbound = Headers::new();
        let headers = BearerAuth::new("test-key-123")
            .auth_headers(&params(&inbound))
            .await
            .unwrap();
        assert_eq!(headers.get("Authorization"), Some("Bearer test-key-123"));
    }

    #[tokio::test]
    async fn test_missing_bearer_env() {
        let inbound = Headers::new();
        let result = BearerAuth::from_env("GANTRY_TEST_SURELY_UNSET_TOKEN")
            .auth_headers(&params(&inbound))
            .await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("GANTRY_TEST_SURELY_UNSET_TOKEN"), "got: {}", message);
    }

    #[tokio::test]
    async fn test_static_auth_env_expansion() {
        std::env::set_var("GANTRY_TEST_CUSTOM_API_KEY", "custom-key-789");

        let auth = StaticAuth::new([("X-API-Key", "key=${ENV:GANTRY_TEST_CUSTOM_API_KEY}")]);
        let inbound = Headers::new();
        let headers = auth.auth_headers(&params(&inbound)).await.unwrap();
        assert_eq!(headers.get("x-api-key"), Some("key=custom-key-789"));
        assert!(auth.validate_credentials().is_ok());

        std::env::remove_var("GANTRY_TEST_CUSTOM_API_KEY");
    }

    #[test]
    fn test_expand_without_references() {
        assert_eq!(expand_env_vars("plain").unwrap(), "plain");
        assert!(expand_env_vars("${ENV:GANTRY_TEST_SURELY_UNSET_VAR}").is_err());
    }
}
