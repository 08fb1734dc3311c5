//! Tracing context threaded through every pipeline stage
//!
//! The pipeline only talks to the [`TraceContext`] trait. [`TracingContext`]
//! is the default implementation on top of `tracing` spans, and
//! [`SpanGuard`] guarantees that a dispatch span is ended exactly once.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{field, Span};
use uuid::Uuid;

use crate::types::StatsRecord;

/// Span tags attached when a child context is created
pub type Tags = BTreeMap<String, String>;

/// Logging, stats and span lifecycle for one unit of work
pub trait TraceContext: Send + Sync {
    /// Create a child context
    fn child(&self, name: &str, tags: &Tags) -> Arc<dyn TraceContext>;

    /// Log a diagnostic message
    fn log(&self, message: &str, data: Option<&Value>);

    /// Log a failure
    fn log_error(&self, message: &str, error: &dyn fmt::Display, data: Option<&Value>);

    /// Record a stats event
    fn stats(&self, record: &StatsRecord);

    /// Close the span
    fn end(&self);

    /// Propagation headers for outbound calls
    fn metadata(&self) -> BTreeMap<String, String>;
}

/// Default [`TraceContext`] backed by a `tracing` span
pub struct TracingContext {
    span: Span,
    trace_id: String,
    span_id: String,
    started: Instant,
    ended: AtomicBool,
}

impl TracingContext {
    /// Create a root context with a fresh trace id
    pub fn root(name: &str) -> Arc<Self> {
        let trace_id = Uuid::new_v4().simple().to_string();
        Arc::new(Self::open(name, &Tags::new(), trace_id))
    }

    fn open(name: &str, tags: &Tags, trace_id: String) -> Self {
        let span_id = Uuid::new_v4().simple().to_string()[..16].to_string();
        let span = tracing::info_span!(
            "gantry",
            label = name,
            trace_id = %trace_id,
            span_id = %span_id,
            tags = ?tags,
            duration_ms = field::Empty,
        );

        Self {
            span,
            trace_id,
            span_id,
            started: Instant::now(),
            ended: AtomicBool::new(false),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl TraceContext for TracingContext {
    fn child(&self, name: &str, tags: &Tags) -> Arc<dyn TraceContext> {
        let _entered = self.span.enter();
        Arc::new(Self::open(name, tags, self.trace_id.clone()))
    }

    fn log(&self, message: &str, data: Option<&Value>) {
        let _entered = self.span.enter();
        match data {
            Some(data) => tracing::debug!(data = %data, "{}", message),
            None => tracing::debug!("{}", message),
        }
    }

    fn log_error(&self, message: &str, error: &dyn fmt::Display, data: Option<&Value>) {
        let _entered = self.span.enter();
        match data {
            Some(data) => tracing::warn!(error = %error, data = %data, "{}", message),
            None => tracing::warn!(error = %error, "{}", message),
        }
    }

    fn stats(&self, record: &StatsRecord) {
        let _entered = self.span.enter();
        tracing::info!(
            target: "gantry::stats",
            service = %record.service,
            action = %record.action,
            request_id = record.request_id.as_deref().unwrap_or(""),
            method = %record.request_method,
            url = %record.request_url,
            request_time_ms = record.request_time,
            status = record.status,
            "action stats"
        );
    }

    fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            tracing::warn!(span_id = %self.span_id, "span ended more than once");
            return;
        }
        self.span
            .record("duration_ms", self.started.elapsed().as_millis() as u64);
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("x-trace-id".to_string(), self.trace_id.clone()),
            ("x-span-id".to_string(), self.span_id.clone()),
        ])
    }
}

/// Owns a dispatch span and ends it exactly once
///
/// The span is ended by [`SpanGuard::finish`], or on drop for exit paths
/// that never reach it.
pub struct SpanGuard {
    ctx: Arc<dyn TraceContext>,
    finished: bool,
}

impl SpanGuard {
    /// Open a child span of `parent`
    pub fn open(parent: &dyn TraceContext, name: &str, tags: &Tags) -> Self {
        Self {
            ctx: parent.child(name, tags),
            finished: false,
        }
    }

    pub fn ctx(&self) -> &Arc<dyn TraceContext> {
        &self.ctx
    }

    /// End the span
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.ctx.end();
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.close();
    }
}
