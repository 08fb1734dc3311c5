//! Executes the assembled request through the selected transport

use serde_json::Value;
use std::time::{Duration, Instant};

use crate::action::{HookScope, ResponseTransform};
use crate::context::TraceContext;
use crate::error::recoverable;
use crate::http::error::TransportError;
use crate::http::transport::{OutboundRequest, Transport};
use crate::types::Headers;

/// Outcome of one upstream call
#[derive(Debug)]
pub struct Execution {
    /// Response payload (after the response transform) or the transport failure
    pub outcome: Result<Value, TransportError>,
    /// Upstream status when one is known
    pub status: Option<u16>,
    pub response_headers: Option<Headers>,
    pub elapsed: Duration,
}

/// Sends one request; retries are the transport's business
pub struct Executor<'a> {
    transport: &'a dyn Transport,
    transform: Option<&'a dyn ResponseTransform>,
}

impl<'a> Executor<'a> {
    pub fn new(transport: &'a dyn Transport, transform: Option<&'a dyn ResponseTransform>) -> Self {
        Self {
            transport,
            transform,
        }
    }

    pub async fn execute(
        &self,
        mut request: OutboundRequest,
        args: &Value,
        ctx: &dyn TraceContext,
    ) -> Execution {
        for (name, value) in ctx.metadata() {
            request.headers.entry(name).or_insert(value);
        }

        tracing::debug!(method = %request.method, url = %request.url, "sending upstream request");
        let started = Instant::now();
        let result = self.transport.request(request).await;
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                let scope = HookScope {
                    args,
                    ctx,
                    response_headers: Some(&response.headers),
                };
                let data = match self.transform {
                    Some(transform) => {
                        let original = response.data.clone();
                        recoverable(
                            ctx,
                            "response_transform",
                            transform.transform(response.data.clone(), &scope).await,
                            || original,
                        )
                    }
                    None => response.data.clone(),
                };
                Execution {
                    outcome: Ok(data),
                    status: Some(response.status),
                    response_headers: Some(response.headers.clone()),
                    elapsed,
                }
            }
            Err(error) => {
                tracing::debug!(error = %error, elapsed_ms = elapsed.as_millis() as u64, "upstream request failed");
                Execution {
                    status: error.status_code,
                    response_headers: error.response.as_ref().map(|r| r.headers.clone()),
                    outcome: Err(error),
                    elapsed,
                }
            }
        }
    }
}
