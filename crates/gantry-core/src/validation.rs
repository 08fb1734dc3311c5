//! Call-argument validation
//!
//! The pipeline consumes the [`Validator`] trait; [`JsonSchemaValidator`]
//! is the default engine, compiling JSON Schemas with the `jsonschema`
//! crate and caching them per schema document.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One rejected argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidField {
    /// Dotted path of the offending field, `$` for the document root
    pub field: String,
    /// What was wrong with it
    pub message: String,
}

impl InvalidField {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Schema validation engine
#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate `args` against `schema`, returning the invalid fields or `None`
    async fn validate(&self, args: &Value, schema: &Value) -> Option<Vec<InvalidField>>;
}

/// JSON Schema validator with a compiled-schema cache
#[derive(Default)]
pub struct JsonSchemaValidator {
    cache: RwLock<HashMap<String, Arc<jsonschema::Validator>>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, schema: &Value) -> Result<Arc<jsonschema::Validator>, String> {
        let key = schema.to_string();
        if let Some(compiled) = self.cache.read().get(&key).cloned() {
            return Ok(compiled);
        }

        let compiled = Arc::new(jsonschema::validator_for(schema).map_err(|e| e.to_string())?);
        self.cache.write().insert(key, compiled.clone());
        Ok(compiled)
    }
}

#[async_trait]
impl Validator for JsonSchemaValidator {
    async fn validate(&self, args: &Value, schema: &Value) -> Option<Vec<InvalidField>> {
        let compiled = match self.compiled(schema) {
            Ok(compiled) => compiled,
            Err(message) => {
                // Uncompilable schemas reject every call
                tracing::error!(error = %message, "validation schema failed to compile");
                return Some(vec![InvalidField::new("$", format!("invalid schema: {}", message))]);
            }
        };

        let fields: Vec<InvalidField> = compiled
            .iter_errors(args)
            .map(|error| InvalidField::new(field_path(&error.instance_path.to_string()), error.to_string()))
            .collect();

        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }
}

/// Convert a JSON pointer into a dotted field path
fn field_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "$".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer", "minimum": 0 }
            }
        })
    }

    #[tokio::test]
    async fn test_valid_args_pass() {
        let validator = JsonSchemaValidator::new();
        let result = validator
            .validate(&json!({"name": "ada", "age": 36}), &user_schema())
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_invalid_args_are_reported() {
        let validator = JsonSchemaValidator::new();
        let fields = validator
            .validate(&json!({"age": -1}), &user_schema())
            .await
            .expect("expected invalid fields");

        assert_eq!(fields.len(), 2);
        assert!(fields.iter().any(|f| f.field == "$"));
        assert!(fields.iter().any(|f| f.field == "age"));
    }

    #[tokio::test]
    async fn test_compiled_schema_is_cached() {
        let validator = JsonSchemaValidator::new();
        let schema = user_schema();
        validator.validate(&json!({"name": "a"}), &schema).await;
        validator.validate(&json!({"name": "b"}), &schema).await;
        assert_eq!(validator.cache.read().len(), 1);
    }

    #[test]
    fn test_field_path() {
        assert_eq!(field_path(""), "$");
        assert_eq!(field_path("/address/zip"), "address.zip");
    }
}
