//! Error types for the Gantry core library
//!
//! This module defines the error taxonomy of the dispatch pipeline,
//! using thiserror for library errors and anyhow for errors raised by
//! user-supplied hooks.

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

use crate::context::TraceContext;
use crate::http::TransportError;
use crate::validation::InvalidField;

/// Main error type for Gantry operations
#[derive(Error, Debug)]
pub enum Error {
    /// Call arguments rejected by the validation engine
    #[error("Validation failed: {} invalid field(s)", fields.len())]
    Validation {
        fields: Vec<InvalidField>,
    },

    /// No endpoint entry could be resolved for the action
    #[error("Endpoint not found: {selector}")]
    EndpointNotFound {
        selector: String,
    },

    /// The resolved endpoint could not be turned into a URL
    #[error("Invalid endpoint: {message}")]
    InvalidEndpoint {
        message: String,
        #[source]
        source: Option<url::ParseError>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The auth provider could not produce credentials
    #[error("Authentication failed: {message}")]
    Auth {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Upstream call failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An optional hook failed; always recovered from inside the pipeline
    #[error("Hook '{hook}' failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error taxonomy driving how the pipeline reacts to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Gateway misconfiguration or missing credentials; terminal and never retried
    Config,
    /// Caller-fixable input problems
    Validation,
    /// Failure inside an optional enrichment step, logged and never propagated
    RecoverableInternal,
    /// Upstream failure, normalized and surfaced to the caller
    Transport,
}

impl Error {
    /// Taxonomy class of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Validation { .. } => ErrorClass::Validation,
            Error::EndpointNotFound { .. }
            | Error::InvalidEndpoint { .. }
            | Error::Configuration { .. }
            | Error::Auth { .. } => ErrorClass::Config,
            Error::Transport(_) => ErrorClass::Transport,
            Error::Hook { .. }
            | Error::Json { .. }
            | Error::Io { .. }
            | Error::Internal { .. } => ErrorClass::RecoverableInternal,
        }
    }

    /// Canonical HTTP status for this error
    pub fn status(&self) -> u16 {
        match self {
            Error::Validation { .. }
            | Error::EndpointNotFound { .. }
            | Error::InvalidEndpoint { .. }
            | Error::Configuration { .. } => 400,
            Error::Auth { .. } => 401,
            Error::Transport(err) => err.status_code.unwrap_or(500),
            _ => 500,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "INVALID_PARAMS",
            Error::EndpointNotFound { .. } => "ENDPOINT_NOT_FOUND",
            Error::InvalidEndpoint { .. } => "INVALID_ENDPOINT",
            Error::Configuration { .. } => "CONFIGURATION_ERROR",
            Error::Auth { .. } => "AUTH_FAILED",
            Error::Transport(_) => "TRANSPORT_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Wrap a failed hook
    pub fn hook(hook: &'static str, source: anyhow::Error) -> Self {
        Error::Hook { hook, source }
    }
}

/// Resolve the outcome of an optional step
///
/// A failure is logged to `ctx` as a recoverable internal error and
/// replaced by `fallback()`; it never reaches the caller.
pub fn recoverable<T>(
    ctx: &dyn TraceContext,
    hook: &'static str,
    result: anyhow::Result<T>,
    fallback: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(source) => {
            let err = Error::hook(hook, source);
            ctx.log_error("optional step failed, continuing", &err, None);
            fallback()
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Config => write!(f, "config"),
            ErrorClass::Validation => write!(f, "validation"),
            ErrorClass::RecoverableInternal => write!(f, "recoverable_internal"),
            ErrorClass::Transport => write!(f, "transport"),
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EndpointNotFound {
            selector: "billing".to_string(),
        };
        assert_eq!(err.to_string(), "Endpoint not found: billing");
    }

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let err = Error::Validation {
            fields: vec![InvalidField::new("name", "is required")],
        };
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "INVALID_PARAMS");
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[test]
    fn test_config_errors_are_400() {
        let err = Error::EndpointNotFound {
            selector: "default".to_string(),
        };
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), "ENDPOINT_NOT_FOUND");
        assert_eq!(err.class(), ErrorClass::Config);
    }

    #[test]
    fn test_auth_failure_is_terminal() {
        let err = Error::Auth {
            message: "no token".to_string(),
            source: anyhow::anyhow!("GANTRY_TOKEN is not set"),
        };
        assert_eq!(err.class(), ErrorClass::Config);
        assert_eq!(err.status(), 401);
        assert_eq!(err.code(), "AUTH_FAILED");
    }

    #[test]
    fn test_hook_errors_are_recoverable() {
        let err = Error::hook("response_transform", anyhow::anyhow!("boom"));
        assert_eq!(err.class(), ErrorClass::RecoverableInternal);
        assert!(err.to_string().contains("response_transform"));
    }

    #[test]
    fn test_recoverable_falls_back() {
        let ctx = crate::context::TracingContext::root("test");
        let value = recoverable(ctx.as_ref(), "params", Err(anyhow::anyhow!("boom")), || 7);
        assert_eq!(value, 7);
        let value = recoverable(ctx.as_ref(), "params", Ok(1), || 7);
        assert_eq!(value, 1);
    }

    #[test]
    fn test_error_class_display() {
        assert_eq!(ErrorClass::Config.to_string(), "config");
        assert_eq!(ErrorClass::Transport.to_string(), "transport");
    }
}
