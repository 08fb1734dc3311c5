//! Outbound header composition
//!
//! Headers are assembled in a fixed order, later steps overriding earlier
//! ones:
//!
//! 1. seed headers (host, accept, language, gateway version)
//! 2. proxy header injection (action injector, else service injector)
//! 3. forwarded header names from service and action
//! 4. pass-through of forwarded inbound headers not already set
//! 5. request id
//! 6. idempotency key for idempotent actions
//! 7. auth provider headers
//! 8. pruning of absent values

use std::collections::BTreeSet;
use uuid::Uuid;

use crate::action::{
    ActionConfig, AuthParams, HeaderInjector, ProxyHeaders, ServiceConfig, ACTION_TYPE_REST,
};
use crate::config::GatewaySettings;
use crate::http::endpoint::ResolvedEndpoint;
use crate::types::{CallInvocation, Headers};
use crate::{Error, Result};

pub const ACCEPT: &str = "application/json";
pub const ACCEPT_ENCODING: &str = "gzip, deflate";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
pub const VERSION_HEADER: &str = "x-gateway-version";

/// Result of header composition
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedHeaders {
    /// Pruned header set
    pub headers: Headers,
    /// Names set by the auth provider
    pub auth_names: BTreeSet<String>,
    /// Language used for the call
    pub language: String,
}

/// Builds the outbound header set for one call
#[derive(Debug, Clone, Copy)]
pub struct HeaderComposer<'a> {
    settings: &'a GatewaySettings,
}

impl<'a> HeaderComposer<'a> {
    pub fn new(settings: &'a GatewaySettings) -> Self {
        Self { settings }
    }

    /// Language of the call: inbound `accept-language`, else the gateway default
    pub fn language(&self, inbound: &Headers) -> String {
        inbound
            .get("accept-language")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.settings.default_language.clone())
    }

    pub async fn compose(
        &self,
        service: &ServiceConfig,
        action: &ActionConfig,
        invocation: &CallInvocation,
        endpoint: &ResolvedEndpoint,
    ) -> Result<ComposedHeaders> {
        let inbound = &invocation.headers;
        let language = self.language(inbound);

        let mut headers = Headers::new();
        if let Some(host) = endpoint.host_header() {
            headers.set("host", host);
        }
        headers.set("accept", ACCEPT);
        headers.set("accept-encoding", ACCEPT_ENCODING);
        headers.set("accept-language", language.as_str());
        headers.set(VERSION_HEADER, self.settings.gateway_version.as_str());

        if let Some(injector) = injector(action, service) {
            headers.merge(&injector.inject(inbound, ACTION_TYPE_REST));
        }

        for name in forwarded_names(service, action) {
            if let Some(value) = inbound.get(name) {
                headers.set_if_absent(name, value);
            }
        }

        if let Some(request_id) = &invocation.request_id {
            headers.set(REQUEST_ID_HEADER, request_id.as_str());
        }

        if action.idempotent {
            let key = inbound
                .get(IDEMPOTENCY_HEADER)
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            headers.set(IDEMPOTENCY_HEADER, key);
        }

        let mut auth_names = BTreeSet::new();
        if let Some(provider) = action.effective_auth(service) {
            let params = AuthParams {
                action_type: ACTION_TYPE_REST,
                service_name: &service.name,
                inbound_headers: inbound,
                auth_args: &invocation.auth_args,
            };
            let auth_headers = provider
                .auth_headers(&params)
                .await
                .map_err(|source| Error::Auth {
                    message: format!("auth provider failed for service '{}'", service.name),
                    source,
                })?;
            auth_names.extend(auth_headers.names().map(str::to_string));
            headers.merge(&auth_headers);
        }

        Ok(ComposedHeaders {
            headers: Headers::from_pairs(headers.prune()),
            auth_names,
            language,
        })
    }
}

/// The single injector invoked for a call; the action's wins
fn injector<'a>(
    action: &'a ActionConfig,
    service: &'a ServiceConfig,
) -> Option<&'a dyn HeaderInjector> {
    match (&action.proxy_headers, &service.proxy_headers) {
        (Some(ProxyHeaders::Inject(injector)), _) | (_, Some(ProxyHeaders::Inject(injector))) => {
            Some(injector.as_ref())
        }
        _ => None,
    }
}

/// Forwarded names from service then action
fn forwarded_names<'a>(
    service: &'a ServiceConfig,
    action: &'a ActionConfig,
) -> impl Iterator<Item = &'a str> {
    [&service.proxy_headers, &action.proxy_headers]
        .into_iter()
        .filter_map(|proxy| match proxy {
            Some(ProxyHeaders::Forward(names)) => Some(names),
            _ => None,
        })
        .flatten()
        .map(String::as_str)
}
