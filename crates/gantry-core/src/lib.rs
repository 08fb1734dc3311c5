//! Gantry Core - request-dispatch pipeline for declarative API gateway actions
//!
//! Given an action configuration and an incoming call, the pipeline resolves
//! the target endpoint, assembles the outbound request (headers, query, body,
//! timeout, auth), executes it through a pluggable transport and normalizes
//! the outcome while emitting telemetry.
//!
//! # Main Components
//!
//! - **Dispatch**: [`Dispatcher`] registers actions and runs calls through the pipeline
//! - **Actions**: [`ActionConfig`] / [`ServiceConfig`] with optional hooks per stage
//! - **HTTP stages**: endpoint resolution, header composition, body/query assembly,
//!   transport selection, execution and error normalization under [`http`]
//! - **Tracing**: the [`TraceContext`] trait with a `tracing`-backed default
//! - **Configuration**: gateway settings and declarative service definitions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gantry_core::{
//!     ActionConfig, CallInvocation, Dispatcher, EndpointTable, GatewaySettings,
//!     ServiceConfig, TracingContext,
//! };
//! use gantry_core::http::{Method, ReqwestTransportFactory};
//!
//! async fn example() -> gantry_core::Result<()> {
//!     let mut dispatcher = Dispatcher::new(
//!         GatewaySettings::default(),
//!         Arc::new(ReqwestTransportFactory::new()),
//!     );
//!     let service = Arc::new(ServiceConfig::new(
//!         "users",
//!         EndpointTable::new().with("default", "https://api.example.com"),
//!     ));
//!     dispatcher.register(service, ActionConfig::new("get", Method::GET, "/users/{id}"))?;
//!
//!     let call = CallInvocation::new(serde_json::json!({"id": 7}), TracingContext::root("gateway"));
//!     match dispatcher.dispatch("users", "get", &call).await {
//!         Ok(success) => println!("{}", success.response_data),
//!         Err(failure) => eprintln!("{}", failure),
//!     }
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod logging;
pub mod telemetry;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use action::{
    ActionConfig, AuthParams, AuthProvider, EndpointSelector, ErrorTransform, HookResult,
    HookScope, ParamsProducer, PathSpec, ProxyHeaders, QuerySerializer, RequestParams,
    ResponseTransform, ServiceConfig,
};
pub use config::{ActionDefinition, GatewaySettings, ServiceDefinition};
pub use context::{SpanGuard, Tags, TraceContext, TracingContext};
pub use dispatch::{DispatchFailure, DispatchResult, DispatchSuccess, Dispatcher};
pub use error::{Error, ErrorClass, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use telemetry::StatsSink;
pub use types::{
    CallInvocation, DebugHeaders, EndpointEntry, EndpointTable, GatewayError, Headers,
    ParsedError, RequestBody, StatsRecord, TransportOverrides,
};
pub use validation::{InvalidField, JsonSchemaValidator, Validator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
