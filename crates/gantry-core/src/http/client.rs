//! reqwest-backed transport
//!
//! [`ReqwestTransport`] is the default [`Transport`]: one `reqwest::Client`
//! configured from [`TransportSettings`], with retries handled by
//! [`execute_with_retry`].

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client as ReqwestClient;
use std::sync::Arc;
use std::time::Duration;

use crate::http::error::{parse_body, TransportError};
use crate::http::retry::{execute_with_retry, RetryPolicy};
use crate::http::transport::{
    OutboundRequest, Transport, TransportFactory, TransportResponse, TransportSettings,
};
use crate::types::{Headers, RequestBody};
use crate::Result;

/// HTTP transport built on reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    retry_policy: RetryPolicy,
    settings: TransportSettings,
}

impl ReqwestTransport {
    /// Create a transport for the given settings
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        let config = &settings.config;
        let redirect = if config.follow_redirects {
            Policy::limited(config.max_redirects)
        } else {
            Policy::none()
        };

        let mut builder = ReqwestClient::builder()
            .timeout(settings.timeout)
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.validate_tls);

        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(connect_timeout_ms));
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder.build().map_err(|e| crate::Error::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(anyhow::Error::new(e)),
        })?;

        Ok(Self {
            client,
            retry_policy: RetryPolicy::new(settings.retries),
            settings: settings.clone(),
        })
    }

    /// Replace the retry policy, keeping the configured retry count
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = RetryPolicy {
            max_retries: self.settings.retries,
            ..policy
        };
        self
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    async fn send_once(&self, request: &OutboundRequest) -> std::result::Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.full_url());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.body(
                serde_json::to_vec(value).map_err(|e| {
                    TransportError::without_response(
                        crate::http::ErrorClassification::ClientError,
                        format!("Failed to encode request body: {}", e),
                    )
                })?,
            ),
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            Some(RequestBody::Binary(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(TransportError::from_request_error)?;

        let status = response.status();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value);
            }
        }

        let text = response
            .text()
            .await
            .map_err(TransportError::from_request_error)?;
        let data = parse_body(&text);

        if !status.is_success() {
            return Err(TransportError::from_response(status.as_u16(), headers, data));
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            headers,
            data,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: OutboundRequest) -> std::result::Result<TransportResponse, TransportError> {
        execute_with_retry(|| self.send_once(&request), self.retry_policy.clone()).await
    }
}

/// Factory producing [`ReqwestTransport`]s
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransportFactory {
    retry_policy: Option<RetryPolicy>,
}

impl ReqwestTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backoff parameters applied to every transport built by this factory
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

impl TransportFactory for ReqwestTransportFactory {
    fn build(&self, settings: &TransportSettings) -> Result<Arc<dyn Transport>> {
        let mut transport = ReqwestTransport::new(settings)?;
        if let Some(policy) = &self.retry_policy {
            transport = transport.with_retry_policy(policy.clone());
        }
        Ok(Arc::new(transport))
    }
}
