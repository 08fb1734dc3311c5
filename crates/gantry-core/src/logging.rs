//! Logging setup for processes embedding the dispatch pipeline
//!
//! This module provides:
//! - Subscriber installation with `EnvFilter` and selectable output formats
//! - Redaction of sensitive headers, JSON values and free text, used for
//!   the debug headers logged on every dispatch

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::IsTerminal;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, overridden by `RUST_LOG`
    pub level: String,
    /// Output format: compact, full, json
    pub format: LogFormat,
    /// Include thread IDs
    pub thread_ids: bool,
    /// Include file and line numbers
    pub source_location: bool,
    /// Module-based filtering
    pub module_filter: Option<HashMap<String, String>>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact format for production
    Compact,
    /// Full format with all details
    Full,
    /// JSON structured format
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            thread_ids: false,
            source_location: false,
            module_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Apply `GANTRY_LOG_*` environment overrides
    pub fn merge_with_env(&mut self) {
        if let Ok(level) = std::env::var("GANTRY_LOG_LEVEL") {
            self.level = level;
        }

        if let Ok(format) = std::env::var("GANTRY_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "compact" => self.format = LogFormat::Compact,
                "full" => self.format = LogFormat::Full,
                "json" => self.format = LogFormat::Json,
                _ => tracing::warn!("Invalid log format: {}, using default", format),
            }
        }
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = create_env_filter(config)?;
    let ansi = std::io::stderr().is_terminal();

    let installed = match config.format {
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_ansi(ansi)
                .with_thread_ids(config.thread_ids)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .compact()
                .finish(),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_ansi(false)
                .with_thread_ids(config.thread_ids)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .json()
                .finish(),
        ),
        LogFormat::Full => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_ansi(ansi)
                .with_thread_ids(config.thread_ids)
                .with_file(config.source_location)
                .with_line_number(config.source_location)
                .finish(),
        ),
    };

    installed.map_err(|e| Error::Configuration {
        message: format!("Failed to initialize logging: {}", e),
        source: None,
    })?;

    tracing::info!(config = ?config, "Logging system initialized");
    Ok(())
}

fn create_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if let Some(module_filters) = &config.module_filter {
        for (module, level) in module_filters {
            let directive: Directive = format!("{}={}", module, level).parse().map_err(|e| {
                Error::Configuration {
                    message: format!("Invalid filter directive: {}", e),
                    source: None,
                }
            })?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Sensitive data redaction utilities
pub mod redaction {
    use regex::Regex;
    use std::sync::OnceLock;

    use crate::types::{DebugHeaders, Headers};

    /// Replacement for redacted values
    pub const REDACTED: &str = "***";

    static API_KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
    static PASSWORD_REGEX: OnceLock<Regex> = OnceLock::new();

    fn patterns() -> [&'static Regex; 3] {
        [
            API_KEY_REGEX.get_or_init(|| {
                Regex::new(r#"(?i)(api[_-]?key|apikey)[=:\s]+['"]?([a-zA-Z0-9_-]{10,})['"]?"#)
                    .expect("Valid regex pattern")
            }),
            TOKEN_REGEX.get_or_init(|| {
                Regex::new(r#"(?i)(token|bearer)[=:\s]+['"]?([a-zA-Z0-9_.-]{10,})['"]?"#)
                    .expect("Valid regex pattern")
            }),
            PASSWORD_REGEX.get_or_init(|| {
                Regex::new(r#"(?i)(password|passwd|pwd)[=:\s]+['"]?([^\s'"]{3,})['"]?"#)
                    .expect("Valid regex pattern")
            }),
        ]
    }

    /// Redact credentials embedded in free text
    pub fn redact_sensitive(input: &str) -> String {
        let mut result = input.to_string();
        for regex in patterns() {
            result = regex.replace_all(&result, "$1=***").to_string();
        }
        result
    }

    /// Redact sensitive keys and embedded credentials in a JSON value
    pub fn redact_json_value(value: &mut serde_json::Value) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    if is_sensitive_key(key) {
                        *val = serde_json::Value::String(REDACTED.to_string());
                    } else {
                        redact_json_value(val);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    redact_json_value(item);
                }
            }
            serde_json::Value::String(s) => {
                *s = redact_sensitive(s);
            }
            _ => {}
        }
    }

    /// Copy of `headers` with credential-bearing values masked
    pub fn redact_headers(headers: &Headers) -> Headers {
        let mut redacted = Headers::new();
        for (name, value) in headers.iter() {
            if is_sensitive_header(name) {
                redacted.set(name, REDACTED);
            } else {
                redacted.set(name, value);
            }
        }
        redacted
    }

    /// Debug headers as JSON with embedded credentials masked
    pub fn redact_debug_headers(debug: &DebugHeaders) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(debug)?;
        redact_json_value(&mut value);
        Ok(value)
    }

    /// Whether a header carries credentials
    pub fn is_sensitive_header(name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        matches!(
            name.as_str(),
            "authorization" | "proxy-authorization" | "cookie" | "set-cookie"
        ) || is_sensitive_key(&name)
    }

    fn is_sensitive_key(key: &str) -> bool {
        let key_lower = key.to_lowercase();
        key_lower.contains("api-key")
            || key_lower.contains("api_key")
            || key_lower.contains("apikey")
            || key_lower.contains("token")
            || key_lower.contains("password")
            || key_lower.contains("passwd")
            || key_lower.contains("secret")
            || key_lower.contains("credential")
            || key_lower.contains("auth")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DebugHeaders, Headers};

    #[test]
    fn test_redaction() {
        let input = "api_key=sk-1234567890abcdef token=bearer_xyz_12345 password=secret123";
        let redacted = redaction::redact_sensitive(input);
        assert!(redacted.contains("api_key=***"));
        assert!(redacted.contains("token=***"));
        assert!(redacted.contains("password=***"));
        assert!(!redacted.contains("sk-1234567890abcdef"));
        assert!(!redacted.contains("secret123"));
    }

    #[test]
    fn test_json_redaction() {
        let mut value = serde_json::json!({
            "api_key": "sk-1234567890abcdef",
            "user": "ada",
            "headers": { "authorization": "Bearer token123" }
        });

        redaction::redact_json_value(&mut value);

        assert_eq!(value["api_key"], "***");
        assert_eq!(value["user"], "ada");
        assert_eq!(value["headers"]["authorization"], "***");
    }

    #[test]
    fn test_header_redaction() {
        let headers = Headers::from_pairs([
            ("authorization", "Bearer abc"),
            ("x-api-key", "k"),
            ("cookie", "session=1"),
            ("accept", "application/json"),
        ]);
        let redacted = redaction::redact_headers(&headers);
        assert_eq!(redacted.get("authorization"), Some(redaction::REDACTED));
        assert_eq!(redacted.get("x-api-key"), Some(redaction::REDACTED));
        assert_eq!(redacted.get("cookie"), Some(redaction::REDACTED));
        assert_eq!(redacted.get("accept"), Some("application/json"));
    }

    #[test]
    fn test_debug_header_redaction() {
        let debug = DebugHeaders {
            method: "GET".to_string(),
            url: "https://users.example.com/api/users?token=abcdef123456789".to_string(),
            body: Some("password=hunter2".to_string()),
            language: "en".to_string(),
            request_id: Some("r1".to_string()),
            version: "1.0.0".to_string(),
            content_type: None,
        };

        let value = redaction::redact_debug_headers(&debug).unwrap();

        assert_eq!(value["url"], "https://users.example.com/api/users?token=***");
        assert_eq!(value["body"], "password=***");
        assert_eq!(value["request-id"], "r1");
        assert_eq!(value["method"], "GET");
        assert!(value.get("content-type").is_none());
    }

    #[test]
    fn test_log_format_deserialization() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }
}
