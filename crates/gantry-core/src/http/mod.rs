//! Outbound HTTP stages of the dispatch pipeline
//!
//! This module provides:
//! - Endpoint resolution and URL building
//! - Header composition, including auth
//! - Body and query assembly
//! - Transport selection and the default reqwest transport
//! - Retry logic with exponential backoff inside the transport
//! - Execution and upstream error normalization

pub mod auth;
pub mod builder;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod headers;
pub mod normalizer;
pub mod retry;
pub mod timeout;
pub mod transport;

pub use auth::{BearerAuth, StaticAuth};
pub use builder::{BuiltRequest, RequestAssembler, DEBUG_BODY_LIMIT};
pub use client::{ReqwestTransport, ReqwestTransportFactory};
pub use endpoint::ResolvedEndpoint;
pub use error::{ErrorClassification, ErrorResponse, TransportError};
pub use executor::{Execution, Executor};
pub use headers::{ComposedHeaders, HeaderComposer};
pub use normalizer::{DefaultErrorParser, ErrorNormalizer, ErrorParser};
pub use retry::{RetryDecision, RetryPolicy};
pub use timeout::{TimeoutChain, TimeoutSource};
pub use transport::{
    OutboundRequest, SelectedTransport, Transport, TransportCache, TransportConfig,
    TransportFactory, TransportPlan, TransportResponse, TransportSettings,
};

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
