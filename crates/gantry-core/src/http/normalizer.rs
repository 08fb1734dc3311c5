//! Upstream error normalization
//!
//! A failed upstream call becomes a [`GatewayError`] in two stages: the
//! action's error transform (only when the upstream answered), then the
//! fallback [`ErrorParser`]. Either stage may fail; failures are logged and
//! the next stage is tried. When neither produces a result the caller gets
//! an `UNPARSED_ERROR` carrying the raw upstream body.

use serde_json::Value;

use crate::action::{ErrorTransform, HookScope};
use crate::http::error::{ErrorClassification, TransportError};
use crate::types::{GatewayError, ParsedError};

/// Code returned when no stage could interpret the failure
pub const UNPARSED_ERROR: &str = "UNPARSED_ERROR";

/// Status used when neither the normalized nor the raw error carries one
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Fallback error parser
pub trait ErrorParser: Send + Sync {
    fn parse(&self, error: &TransportError, language: &str) -> anyhow::Result<ParsedError>;
}

/// Status and body based parser with localized messages
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorParser;

impl DefaultErrorParser {
    pub fn new() -> Self {
        Self
    }

    fn classify(error: &TransportError) -> (Option<u16>, &'static str) {
        match (error.classification, error.status_code) {
            (ErrorClassification::TimeoutError, _) => (Some(504), "UPSTREAM_TIMEOUT"),
            (ErrorClassification::ConnectionError, _) | (ErrorClassification::NetworkError, None) => {
                (Some(502), "UPSTREAM_UNAVAILABLE")
            }
            (_, Some(401)) => (Some(401), "UNAUTHORIZED"),
            (_, Some(403)) => (Some(403), "FORBIDDEN"),
            (_, Some(404)) => (Some(404), "NOT_FOUND"),
            (_, Some(429)) => (Some(429), "RATE_LIMITED"),
            (_, Some(status @ 400..=499)) => (Some(status), "UPSTREAM_REJECTED"),
            (_, status) => (status, "UPSTREAM_ERROR"),
        }
    }
}

impl ErrorParser for DefaultErrorParser {
    fn parse(&self, error: &TransportError, language: &str) -> anyhow::Result<ParsedError> {
        let (status, code) = Self::classify(error);

        let Some(response) = &error.response else {
            return Ok(ParsedError::new(status, code, localized_message(code, language)));
        };

        let (upstream_code, upstream_message) = extract_upstream_error(&response.data);
        let message = upstream_message.unwrap_or_else(|| localized_message(code, language).to_string());
        let mut parsed = ParsedError::new(status, upstream_code.unwrap_or_else(|| code.to_string()), message);
        if !response.data.is_null() {
            parsed = parsed.with_details(response.data.clone());
        }
        Ok(parsed)
    }
}

/// Pull a code and message out of common upstream error bodies
///
/// Recognized shapes: `{"error": {"code", "message"}}`, `{"error": "..."}`,
/// `{"type", "message"}` and `{"message"}`.
pub fn extract_upstream_error(data: &Value) -> (Option<String>, Option<String>) {
    if let Some(error) = data.get("error") {
        if let Some(message) = error.as_str() {
            return (None, Some(message.to_string()));
        }
        let code = error.get("code").and_then(value_to_code);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string());
        return (code, message);
    }

    if let Some(error_type) = data.get("type") {
        let code = value_to_code(error_type);
        let message = data
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string());
        return (code, message);
    }

    if let Some(message) = data.get("message").and_then(|m| m.as_str()) {
        return (None, Some(message.to_string()));
    }

    (None, None)
}

fn value_to_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Message for a normalized code; unknown languages fall back to English
pub fn localized_message(code: &str, language: &str) -> &'static str {
    let lang = language
        .split([',', ';', '-', '_'])
        .next()
        .unwrap_or("en")
        .trim()
        .to_ascii_lowercase();

    match (code, lang.as_str()) {
        ("UPSTREAM_TIMEOUT", "es") => "El servicio remoto no respondió a tiempo",
        ("UPSTREAM_TIMEOUT", "fr") => "Le service distant n'a pas répondu à temps",
        ("UPSTREAM_TIMEOUT", "de") => "Der entfernte Dienst hat nicht rechtzeitig geantwortet",
        ("UPSTREAM_TIMEOUT", _) => "The upstream service did not respond in time",

        ("UPSTREAM_UNAVAILABLE", "es") => "El servicio remoto no está disponible",
        ("UPSTREAM_UNAVAILABLE", "fr") => "Le service distant est indisponible",
        ("UPSTREAM_UNAVAILABLE", "de") => "Der entfernte Dienst ist nicht erreichbar",
        ("UPSTREAM_UNAVAILABLE", _) => "The upstream service is unavailable",

        ("UNAUTHORIZED", "es") => "Credenciales no válidas",
        ("UNAUTHORIZED", "fr") => "Identifiants invalides",
        ("UNAUTHORIZED", "de") => "Ungültige Anmeldedaten",
        ("UNAUTHORIZED", _) => "Invalid credentials",

        ("FORBIDDEN", "es") => "Acceso denegado",
        ("FORBIDDEN", "fr") => "Accès refusé",
        ("FORBIDDEN", "de") => "Zugriff verweigert",
        ("FORBIDDEN", _) => "Access denied",

        ("NOT_FOUND", "es") => "Recurso no encontrado",
        ("NOT_FOUND", "fr") => "Ressource introuvable",
        ("NOT_FOUND", "de") => "Ressource nicht gefunden",
        ("NOT_FOUND", _) => "Resource not found",

        ("RATE_LIMITED", "es") => "Demasiadas solicitudes",
        ("RATE_LIMITED", "fr") => "Trop de requêtes",
        ("RATE_LIMITED", "de") => "Zu viele Anfragen",
        ("RATE_LIMITED", _) => "Too many requests",

        ("UPSTREAM_REJECTED", "es") => "El servicio remoto rechazó la solicitud",
        ("UPSTREAM_REJECTED", "fr") => "Le service distant a rejeté la requête",
        ("UPSTREAM_REJECTED", "de") => "Der entfernte Dienst hat die Anfrage abgelehnt",
        ("UPSTREAM_REJECTED", _) => "The upstream service rejected the request",

        (_, "es") => "Error del servicio remoto",
        (_, "fr") => "Erreur du service distant",
        (_, "de") => "Fehler des entfernten Dienstes",
        _ => "The upstream service returned an error",
    }
}

/// Turns a [`TransportError`] into the caller-facing [`GatewayError`]
pub struct ErrorNormalizer<'a> {
    parser: &'a dyn ErrorParser,
    transform: Option<&'a dyn ErrorTransform>,
}

impl<'a> ErrorNormalizer<'a> {
    pub fn new(parser: &'a dyn ErrorParser, transform: Option<&'a dyn ErrorTransform>) -> Self {
        Self { parser, transform }
    }

    pub async fn normalize(
        &self,
        error: &TransportError,
        language: &str,
        scope: &HookScope<'_>,
        request_id: Option<String>,
    ) -> GatewayError {
        let parsed = match self.transformed(error, scope).await {
            Some(parsed) => Some(parsed),
            None => match self.parser.parse(error, language) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    scope.ctx.log_error("error parser failed", &err, None);
                    None
                }
            },
        };

        match parsed {
            Some(parsed) => GatewayError {
                status: parsed
                    .status
                    .or(error.status_code)
                    .unwrap_or(DEFAULT_ERROR_STATUS),
                code: parsed.code,
                message: parsed.message,
                details: parsed.details,
                request_id,
            },
            None => GatewayError {
                status: error.status_code.unwrap_or(DEFAULT_ERROR_STATUS),
                code: UNPARSED_ERROR.to_string(),
                message: error.message.clone(),
                details: error.response.as_ref().map(|r| r.data.clone()),
                request_id,
            },
        }
    }

    async fn transformed(&self, error: &TransportError, scope: &HookScope<'_>) -> Option<ParsedError> {
        let transform = self.transform?;
        let response = error.response.as_ref()?;
        match transform.transform(response, scope).await {
            Ok(parsed) => parsed,
            Err(err) => {
                scope.ctx.log_error("error transform failed", &err, None);
                None
            }
        }
    }
}
