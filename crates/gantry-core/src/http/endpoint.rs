//! Endpoint resolution
//!
//! Turns an action's endpoint selector and path into the concrete URL of
//! the upstream call. Resolution order: computed selector, named entry,
//! then the table's `default` entry.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use url::Url;

use crate::action::{EndpointSelector, PathSpec};
use crate::types::{EndpointEntry, EndpointTable, TransportOverrides};
use crate::validation::InvalidField;
use crate::{Error, Result};

/// Characters left unescaped in interpolated path segments
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Valid regex pattern")
    })
}

/// Outcome of endpoint resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoint {
    /// Base URL of the selected entry
    pub base_url: String,
    /// Base URL joined with the action path
    pub url: Url,
    /// Transport overrides carried by the entry, not yet applied
    pub overrides: Option<TransportOverrides>,
}

impl ResolvedEndpoint {
    /// `host[:port]` of the target
    pub fn host_header(&self) -> Option<String> {
        host_header(&self.url)
    }
}

/// Select the endpoint entry for a call
pub fn select_entry(
    selector: &EndpointSelector,
    table: &EndpointTable,
    args: &Value,
) -> Result<EndpointEntry> {
    let entry = match selector {
        EndpointSelector::Computed(select) => select(table, args),
        EndpointSelector::Named(name) => table.get(name).cloned(),
        EndpointSelector::Default => table.default_entry().cloned(),
    };

    entry.ok_or_else(|| Error::EndpointNotFound {
        selector: selector.describe(),
    })
}

/// Resolve the full upstream URL for a call
pub fn resolve(
    selector: &EndpointSelector,
    path: &PathSpec,
    table: &EndpointTable,
    args: &Value,
) -> Result<ResolvedEndpoint> {
    let entry = select_entry(selector, table, args)?;
    let path = render_path(path, args)?;
    let url = join_url(entry.url(), &path)?;

    Ok(ResolvedEndpoint {
        base_url: entry.url().to_string(),
        url,
        overrides: entry.overrides().cloned(),
    })
}

/// Produce the request path from a static template or a computed path
pub fn render_path(path: &PathSpec, args: &Value) -> Result<String> {
    let template = match path {
        PathSpec::Computed(compute) => return Ok(compute(args)),
        PathSpec::Static(template) => template,
    };

    let mut missing = Vec::new();
    let rendered = placeholder_regex().replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match args.get(name) {
            Some(Value::String(s)) => utf8_percent_encode(s, PATH_SEGMENT).to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => {
                missing.push(InvalidField::new(name, "required path parameter is missing"));
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(Error::Validation { fields: missing });
    }
    Ok(rendered.into_owned())
}

/// Append `path` to `base` without discarding the base path
pub fn join_url(base: &str, path: &str) -> Result<Url> {
    let joined = if path.is_empty() {
        base.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    Url::parse(&joined).map_err(|e| Error::InvalidEndpoint {
        message: format!("cannot build URL from base '{}' and path '{}'", base, path),
        source: Some(e),
    })
}

/// `host[:port]` of a URL; the port is kept whenever it is explicit
pub fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
