//! Action dispatch
//!
//! [`Dispatcher`] owns the registered actions and everything built for them
//! at setup time: transport plans and default transports. A dispatch walks
//! the pipeline stages in order:
//!
//! validation → endpoint resolution → header composition → body/query
//! assembly → transport selection → execution → error normalization →
//! telemetry
//!
//! Required stages stop the pipeline on failure; optional hooks are logged
//! and skipped. Every dispatch emits telemetry once and closes its span once.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::action::{ActionConfig, HookScope, ServiceConfig};
use crate::config::GatewaySettings;
use crate::context::{SpanGuard, Tags, TraceContext};
use crate::http::builder::RequestAssembler;
use crate::http::endpoint;
use crate::http::executor::Executor;
use crate::http::headers::HeaderComposer;
use crate::http::normalizer::{DefaultErrorParser, ErrorNormalizer, ErrorParser};
use crate::http::transport::{
    OutboundRequest, TransportCache, TransportFactory, TransportPlan, TransportSettings,
};
use crate::logging::redaction::redact_debug_headers;
use crate::telemetry::TelemetryEmitter;
use crate::types::{CallInvocation, DebugHeaders, GatewayError};
use crate::validation::{JsonSchemaValidator, Validator};
use crate::{Error, Result};

/// Successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSuccess {
    pub response_data: Value,
    pub debug_headers: DebugHeaders,
}

/// Failed dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    pub error: GatewayError,
    pub debug_headers: DebugHeaders,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.error.status, self.error.code, self.error.message
        )
    }
}

impl std::error::Error for DispatchFailure {}

/// Outcome of [`Dispatcher::dispatch`]
pub type DispatchResult = std::result::Result<DispatchSuccess, DispatchFailure>;

/// An action ready for dispatch
#[derive(Debug, Clone)]
pub struct RegisteredAction {
    pub service: Arc<ServiceConfig>,
    pub action: Arc<ActionConfig>,
    pub plan: TransportPlan,
}

/// Caller-facing error for a pipeline failure
pub fn gateway_error(error: &Error, request_id: Option<String>) -> GatewayError {
    let details = match error {
        Error::Validation { fields } => serde_json::to_value(fields).ok(),
        _ => None,
    };
    GatewayError {
        status: error.status(),
        code: error.code().to_string(),
        message: error.to_string(),
        details,
        request_id,
    }
}

/// Log the debug headers with credentials masked
fn log_debug_headers(ctx: &dyn TraceContext, message: &str, debug: &DebugHeaders) {
    match redact_debug_headers(debug) {
        Ok(data) => ctx.log(message, Some(&data)),
        Err(error) => ctx.log_error("debug headers not logged", &error, None),
    }
}

/// Dispatches calls to registered actions
pub struct Dispatcher {
    settings: GatewaySettings,
    validator: Arc<dyn Validator>,
    error_parser: Arc<dyn ErrorParser>,
    transports: TransportCache,
    actions: HashMap<(String, String), RegisteredAction>,
}

impl Dispatcher {
    /// Create a dispatcher with the default validator and error parser
    pub fn new(settings: GatewaySettings, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            settings,
            validator: Arc::new(JsonSchemaValidator::new()),
            error_parser: Arc::new(DefaultErrorParser::new()),
            transports: TransportCache::new(factory),
            actions: HashMap::new(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_error_parser(mut self, parser: Arc<dyn ErrorParser>) -> Self {
        self.error_parser = parser;
        self
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Transport inputs of an action
    pub fn plan(&self, service: &ServiceConfig, action: &ActionConfig) -> TransportPlan {
        let fallback_timeout = service
            .timeout
            .unwrap_or_else(|| self.settings.default_timeout());
        let retries = action
            .retries
            .or(service.retries)
            .unwrap_or(self.settings.default_retries);

        TransportPlan {
            defaults: TransportSettings::new(
                action.timeout.unwrap_or(fallback_timeout),
                retries,
                action.transport.clone(),
            ),
            action_timeout: action.timeout,
            action_retries: action.retries,
            fallback_timeout,
        }
    }

    /// Register an action and build its default transport
    pub fn register(&mut self, service: Arc<ServiceConfig>, action: ActionConfig) -> Result<()> {
        let plan = self.plan(&service, &action);
        self.transports.register(&plan.defaults)?;

        tracing::info!(
            service = %service.name,
            action = %action.name,
            method = %action.method,
            timeout_ms = plan.defaults.timeout.as_millis() as u64,
            retries = plan.defaults.retries,
            "registered action"
        );

        let key = (service.name.clone(), action.name.clone());
        self.actions.insert(
            key,
            RegisteredAction {
                service,
                action: Arc::new(action),
                plan,
            },
        );
        Ok(())
    }

    /// Register every action of a service
    pub fn register_service<I>(&mut self, service: Arc<ServiceConfig>, actions: I) -> Result<()>
    where
        I: IntoIterator<Item = ActionConfig>,
    {
        for action in actions {
            self.register(service.clone(), action)?;
        }
        Ok(())
    }

    pub fn action(&self, service: &str, action: &str) -> Option<&RegisteredAction> {
        self.actions.get(&(service.to_string(), action.to_string()))
    }

    /// Number of distinct default transports
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Run one call through the pipeline
    pub async fn dispatch(
        &self,
        service: &str,
        action: &str,
        invocation: &CallInvocation,
    ) -> DispatchResult {
        let Some(registered) = self.action(service, action) else {
            return self.unknown_action(service, action, invocation);
        };

        let mut tags = Tags::new();
        tags.insert("service".to_string(), service.to_string());
        tags.insert("action".to_string(), action.to_string());
        if let Some(request_id) = &invocation.request_id {
            tags.insert("request_id".to_string(), request_id.clone());
        }

        let guard = SpanGuard::open(invocation.ctx.as_ref(), &format!("{}.{}", service, action), &tags);
        let ctx = guard.ctx().clone();

        let mut debug = DebugHeaders {
            method: registered.action.method.to_string(),
            url: String::new(),
            body: None,
            language: HeaderComposer::new(&self.settings).language(&invocation.headers),
            request_id: invocation.request_id.clone(),
            version: self.settings.gateway_version.clone(),
            content_type: None,
        };
        let mut emitter = TelemetryEmitter::new(
            service,
            action,
            invocation.request_id.clone(),
            debug.clone(),
        );

        let outcome = self
            .run(registered, invocation, ctx.as_ref(), &mut debug, &mut emitter)
            .await;

        log_debug_headers(ctx.as_ref(), "dispatch finished", &debug);
        emitter.set_debug(debug.clone());
        emitter
            .emit(
                registered.service.stats_sink.as_deref(),
                invocation.ctx.as_ref(),
                ctx.as_ref(),
            )
            .await;
        guard.finish();

        match outcome {
            Ok(response_data) => Ok(DispatchSuccess {
                response_data,
                debug_headers: debug,
            }),
            Err(error) => Err(DispatchFailure {
                error,
                debug_headers: debug,
            }),
        }
    }

    async fn run(
        &self,
        registered: &RegisteredAction,
        invocation: &CallInvocation,
        ctx: &dyn TraceContext,
        debug: &mut DebugHeaders,
        emitter: &mut TelemetryEmitter,
    ) -> std::result::Result<Value, GatewayError> {
        let service = registered.service.as_ref();
        let action = registered.action.as_ref();
        let request_id = invocation.request_id.clone();

        let fail = |error: Error, emitter: &mut TelemetryEmitter| {
            let data = json!({"class": error.class(), "code": error.code()});
            ctx.log_error("dispatch failed", &error, Some(&data));
            emitter.set_status(error.status());
            gateway_error(&error, request_id.clone())
        };

        if let Some(schema) = action.effective_schema(service) {
            if let Some(fields) = self.validator.validate(&invocation.args, schema).await {
                if !fields.is_empty() {
                    return Err(fail(Error::Validation { fields }, emitter));
                }
            }
        }

        let resolved = match endpoint::resolve(
            &action.endpoint,
            &action.path,
            &service.endpoints,
            &invocation.args,
        ) {
            Ok(resolved) => resolved,
            Err(error) => return Err(fail(error, emitter)),
        };
        debug.url = resolved.url.to_string();

        let composed = match HeaderComposer::new(&self.settings)
            .compose(service, action, invocation, &resolved)
            .await
        {
            Ok(composed) => composed,
            Err(error) => return Err(fail(error, emitter)),
        };
        let language = composed.language.clone();

        let scope = HookScope {
            args: &invocation.args,
            ctx,
            response_headers: None,
        };
        let built = RequestAssembler::new(action).build(composed, &scope).await;
        debug.body = built.body_preview.clone();
        debug.content_type = built.content_type().map(str::to_string);
        emitter.set_headers(&built.headers);
        log_debug_headers(ctx, "request built", debug);

        let selected = match self.transports.select(
            &registered.plan,
            invocation.timeout,
            resolved.overrides.as_ref(),
        ) {
            Ok(selected) => selected,
            Err(error) => return Err(fail(error, emitter)),
        };
        tracing::debug!(
            timeout_ms = selected.settings.timeout.as_millis() as u64,
            timeout_source = ?selected.timeout_source,
            per_call = selected.per_call,
            "selected transport"
        );

        let request = OutboundRequest {
            method: action.method.clone(),
            url: resolved.url.to_string(),
            query: built.query.clone(),
            headers: built.headers.prune(),
            body: built.body.clone(),
        };

        let execution = Executor::new(
            selected.transport.as_ref(),
            action.response_transform.as_deref(),
        )
        .execute(request, &invocation.args, ctx)
        .await;

        match execution.outcome {
            Ok(data) => {
                emitter.set_outcome(
                    execution.elapsed,
                    execution.status.unwrap_or(200),
                    Some(&data),
                    ctx,
                );
                Ok(data)
            }
            Err(error) => {
                let scope = HookScope {
                    args: &invocation.args,
                    ctx,
                    response_headers: execution.response_headers.as_ref(),
                };
                let normalized = ErrorNormalizer::new(
                    self.error_parser.as_ref(),
                    action.error_transform.as_deref(),
                )
                .normalize(&error, &language, &scope, request_id.clone())
                .await;
                ctx.log_error("upstream call failed", &error, None);
                emitter.set_outcome(execution.elapsed, normalized.status, None, ctx);
                Err(normalized)
            }
        }
    }

    fn unknown_action(&self, service: &str, action: &str, invocation: &CallInvocation) -> DispatchResult {
        let error = Error::Configuration {
            message: format!("no action '{}' registered for service '{}'", action, service),
            source: None,
        };
        invocation.ctx.log_error("dispatch failed", &error, None);

        let debug_headers = DebugHeaders {
            language: HeaderComposer::new(&self.settings).language(&invocation.headers),
            request_id: invocation.request_id.clone(),
            version: self.settings.gateway_version.clone(),
            ..Default::default()
        };
        log_debug_headers(invocation.ctx.as_ref(), "dispatch finished", &debug_headers);
        let mut emitter = TelemetryEmitter::new(
            service,
            action,
            invocation.request_id.clone(),
            debug_headers.clone(),
        );
        emitter.set_status(error.status());
        invocation.ctx.stats(emitter.record());

        Err(DispatchFailure {
            error: gateway_error(&error, invocation.request_id.clone()),
            debug_headers,
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("actions", &self.actions.len())
            .field("transports", &self.transports.len())
            .finish_non_exhaustive()
    }
}
