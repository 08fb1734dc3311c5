//! Per-dispatch telemetry
//!
//! Every dispatch produces exactly one [`StatsRecord`], successful or not.
//! The record goes to the service's [`StatsSink`] when one is configured,
//! otherwise to the dispatch context's `stats`.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::context::TraceContext;
use crate::error::recoverable;
use crate::logging::redaction::redact_headers;
use crate::types::{DebugHeaders, Headers, StatsRecord};

/// Custom destination for stats records
#[async_trait]
pub trait StatsSink: Send + Sync {
    /// `headers` are the outbound headers with credentials masked
    async fn record(
        &self,
        record: &StatsRecord,
        headers: &Headers,
        parent: &dyn TraceContext,
        debug: &DebugHeaders,
    ) -> anyhow::Result<()>;
}

/// Byte length of the serialized payload
pub fn response_size<T: Serialize + ?Sized>(payload: &T) -> anyhow::Result<usize> {
    Ok(serde_json::to_vec(payload)?.len())
}

/// Payload size for a stats record; a failure is logged and the size left out
pub fn measure_response<T: Serialize + ?Sized>(ctx: &dyn TraceContext, payload: &T) -> Option<usize> {
    recoverable(ctx, "response_size", response_size(payload).map(Some), || None)
}

/// Collects what a dispatch reports and emits it once
#[derive(Debug, Clone)]
pub struct TelemetryEmitter {
    record: StatsRecord,
    headers: Headers,
    debug: DebugHeaders,
}

impl TelemetryEmitter {
    pub fn new(
        service: &str,
        action: &str,
        request_id: Option<String>,
        debug: DebugHeaders,
    ) -> Self {
        Self {
            record: StatsRecord {
                timestamp: Utc::now(),
                service: service.to_string(),
                action: action.to_string(),
                request_id,
                request_method: debug.method.clone(),
                request_url: debug.url.clone(),
                request_time: 0.0,
                response_size: None,
                status: 0,
            },
            headers: Headers::new(),
            debug,
        }
    }

    /// Outbound headers, masked before they are kept
    pub fn set_headers(&mut self, headers: &Headers) {
        self.headers = redact_headers(headers);
    }

    pub fn set_debug(&mut self, debug: DebugHeaders) {
        self.record.request_method = debug.method.clone();
        self.record.request_url = debug.url.clone();
        self.debug = debug;
    }

    /// Upstream timing and status
    pub fn set_outcome(
        &mut self,
        elapsed: Duration,
        status: u16,
        payload: Option<&Value>,
        ctx: &dyn TraceContext,
    ) {
        self.record.request_time = elapsed.as_micros() as f64 / 1000.0;
        self.record.status = status;
        self.record.response_size = payload.and_then(|payload| measure_response(ctx, payload));
    }

    /// Status only, for dispatches that never reached the upstream
    pub fn set_status(&mut self, status: u16) {
        self.record.status = status;
    }

    pub fn record(&self) -> &StatsRecord {
        &self.record
    }

    /// Send the record to `sink`, or to `ctx` when there is none
    pub async fn emit(
        self,
        sink: Option<&dyn StatsSink>,
        parent: &dyn TraceContext,
        ctx: &dyn TraceContext,
    ) {
        match sink {
            Some(sink) => {
                let result = sink
                    .record(&self.record, &self.headers, parent, &self.debug)
                    .await;
                recoverable(ctx, "stats_sink", result, || ());
            }
            None => ctx.stats(&self.record),
        }
    }
}
