use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::error;

use crate::types::CardSpec;

/// The published card schema, embedded so validation never depends on the
/// working directory
pub const CARD_SCHEMA_SOURCE: &str = include_str!("../../../../schemas/card_spec.v1.json");

static CARD_SCHEMA_JSON: Lazy<Option<Value>> = Lazy::new(|| match serde_json::from_str(CARD_SCHEMA_SOURCE) {
    Ok(value) => Some(value),
    Err(e) => {
        error!("Embedded card schema is not valid JSON: {}", e);
        None
    }
});

static CARD_SCHEMA: Lazy<Option<JSONSchema>> = Lazy::new(|| {
    let schema = CARD_SCHEMA_JSON.as_ref()?;
    match JSONSchema::options().compile(schema) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            error!("Failed to compile card schema: {}", e);
            None
        }
    }
});

/// Validate a serialized card against the schema, returning one message per
/// violation. An unusable schema is itself reported as a violation.
pub fn schema_violations(instance: &Value) -> Vec<String> {
    let Some(compiled) = CARD_SCHEMA.as_ref() else {
        return vec!["card schema unavailable".to_string()];
    };
    match compiled.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{} at {}", e, path)
                }
            })
            .collect(),
    }
}

/// Check one written record: it must be JSON, satisfy the schema and decode
/// as a `CardSpec`
pub fn validate_record(text: &str) -> Vec<String> {
    let instance: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return vec![format!("not valid JSON: {}", e)],
    };
    let mut problems = schema_violations(&instance);
    if let Err(e) = serde_json::from_value::<CardSpec>(instance) {
        problems.push(format!("does not decode as a card record: {}", e));
    }
    problems
}
