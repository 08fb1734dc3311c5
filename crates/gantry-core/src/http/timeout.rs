//! Timeout resolution for outbound calls
//!
//! Timeouts can be set per call, per action, per endpoint entry and as a
//! service or gateway default. The most specific value wins in that order.

use std::time::Duration;

/// Where the effective timeout came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutSource {
    Call,
    Action,
    Endpoint,
    Default,
}

/// Timeout candidates for one call
#[derive(Debug, Clone, Copy)]
pub struct TimeoutChain {
    pub call: Option<Duration>,
    pub action: Option<Duration>,
    pub endpoint: Option<Duration>,
    pub default: Duration,
}

impl TimeoutChain {
    pub fn new(default: Duration) -> Self {
        Self {
            call: None,
            action: None,
            endpoint: None,
            default,
        }
    }

    pub fn with_call(mut self, timeout: Option<Duration>) -> Self {
        self.call = timeout;
        self
    }

    pub fn with_action(mut self, timeout: Option<Duration>) -> Self {
        self.action = timeout;
        self
    }

    pub fn with_endpoint(mut self, timeout: Option<Duration>) -> Self {
        self.endpoint = timeout;
        self
    }

    /// Effective timeout: per-call > action > endpoint > default
    pub fn resolve(&self) -> (Duration, TimeoutSource) {
        if let Some(timeout) = self.call {
            (timeout, TimeoutSource::Call)
        } else if let Some(timeout) = self.action {
            (timeout, TimeoutSource::Action)
        } else if let Some(timeout) = self.endpoint {
            (timeout, TimeoutSource::Endpoint)
        } else {
            (self.default, TimeoutSource::Default)
        }
    }

    pub fn effective(&self) -> Duration {
        self.resolve().0
    }
}

/// Validate a timeout value before a client is built with it
pub fn validate_timeout(timeout: Duration) -> Result<(), String> {
    if timeout.is_zero() {
        return Err("Request timeout cannot be zero".to_string());
    }
    Ok(())
}
