//! Transport error classification
//!
//! Every failure reported by a transport is a [`TransportError`]: a status
//! code when the upstream answered, a classification for retry decisions,
//! and the upstream error response when one was received.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::Headers;

/// Classification of transport errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// Client errors (4xx) - should not retry
    ClientError,
    /// Server errors (5xx) - should retry
    ServerError,
    /// Network errors - should retry
    NetworkError,
    /// Request exceeded its timeout - should retry
    TimeoutError,
    /// Connection could not be established - should retry
    ConnectionError,
    /// Rate limiting - should retry with backoff
    RateLimitError,
    /// Authentication errors - should not retry
    AuthenticationError,
    /// Unknown errors - default to no retry
    Unknown,
}

impl ErrorClassification {
    /// Check if this error type should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::ServerError
                | ErrorClassification::NetworkError
                | ErrorClassification::TimeoutError
                | ErrorClassification::ConnectionError
                | ErrorClassification::RateLimitError
        )
    }

    /// Classify HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorClassification::AuthenticationError,
            429 => ErrorClassification::RateLimitError,
            400..=499 => ErrorClassification::ClientError,
            500..=599 => ErrorClassification::ServerError,
            _ => ErrorClassification::Unknown,
        }
    }
}

/// Upstream error response carried by a transport error
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: u16,
    pub headers: Headers,
    pub data: Value,
}

/// Failure reported by a transport
#[derive(Debug, Clone)]
pub struct TransportError {
    /// HTTP status code if available
    pub status_code: Option<u16>,
    /// Error classification for retry logic
    pub classification: ErrorClassification,
    /// Human-readable error message
    pub message: String,
    /// Upstream response, when the upstream answered
    pub response: Option<ErrorResponse>,
    /// Retry-After header value if present
    pub retry_after: Option<u64>,
}

impl TransportError {
    /// Build from a non-2xx upstream response
    pub fn from_response(status: u16, headers: Headers, data: Value) -> Self {
        let retry_after = headers.get("retry-after").and_then(|s| s.parse::<u64>().ok());
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unexpected status");

        Self {
            status_code: Some(status),
            classification: ErrorClassification::from_status(status),
            message: format!("Upstream responded with {} {}", status, reason),
            response: Some(ErrorResponse {
                status,
                headers,
                data,
            }),
            retry_after,
        }
    }

    /// Create from a network/request error
    pub fn from_request_error(error: reqwest::Error) -> Self {
        let classification = if error.is_timeout() {
            ErrorClassification::TimeoutError
        } else if error.is_connect() {
            ErrorClassification::ConnectionError
        } else if error.is_request() || error.is_body() {
            ErrorClassification::NetworkError
        } else {
            ErrorClassification::Unknown
        };

        Self {
            status_code: error.status().map(|s| s.as_u16()),
            classification,
            message: error.to_string(),
            response: None,
            retry_after: None,
        }
    }

    /// A timeout without any upstream answer
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::without_response(ErrorClassification::TimeoutError, message)
    }

    /// A connection failure without any upstream answer
    pub fn connection(message: impl Into<String>) -> Self {
        Self::without_response(ErrorClassification::ConnectionError, message)
    }

    pub fn without_response(classification: ErrorClassification, message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            classification,
            message: message.into(),
            response: None,
            retry_after: None,
        }
    }

    /// Check if this error should trigger a retry
    pub fn should_retry(&self) -> bool {
        self.classification.is_retryable()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transport Error [{}]: {} (classification: {:?})",
            self.status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.message,
            self.classification
        )
    }
}

impl std::error::Error for TransportError {}

/// Decode a response body: empty is `null`, JSON is parsed, anything else is kept as text
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_classification() {
        assert!(ErrorClassification::ServerError.is_retryable());
        assert!(ErrorClassification::TimeoutError.is_retryable());
        assert!(ErrorClassification::RateLimitError.is_retryable());
        assert!(!ErrorClassification::ClientError.is_retryable());
        assert!(!ErrorClassification::AuthenticationError.is_retryable());
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ErrorClassification::from_status(401),
            ErrorClassification::AuthenticationError
        );
        assert_eq!(
            ErrorClassification::from_status(429),
            ErrorClassification::RateLimitError
        );
        assert_eq!(
            ErrorClassification::from_status(400),
            ErrorClassification::ClientError
        );
        assert_eq!(
            ErrorClassification::from_status(503),
            ErrorClassification::ServerError
        );
    }

    #[test]
    fn test_from_response_keeps_payload() {
        let headers = Headers::from_pairs([("Retry-After", "7")]);
        let error = TransportError::from_response(503, headers, json!({"message": "down"}));

        assert_eq!(error.status_code, Some(503));
        assert_eq!(error.retry_after, Some(7));
        let response = error.response.expect("response expected");
        assert_eq!(response.data, json!({"message": "down"}));
        assert!(error.message.contains("Service Unavailable"));
    }

    #[test]
    fn test_timeout_has_no_status() {
        let error = TransportError::timeout("deadline exceeded");
        assert_eq!(error.status_code, None);
        assert!(error.response.is_none());
        assert!(error.should_retry());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("plain"), json!("plain"));
    }
}
