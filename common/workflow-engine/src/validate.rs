//! Input validation against a workflow's input schema
//!
//! The schema is advisory: required fields must be present and declared
//! fields must have the declared shape, but undeclared inputs pass through.
//! `null` counts as absent for both checks.

use serde_json::Value;

use crate::definition::InputSchema;
use crate::error::{WorkflowError, WorkflowResult};

/// Check invocation inputs against the schema
pub fn validate_inputs(schema: &InputSchema, inputs: &Value) -> WorkflowResult<()> {
    let object = match inputs {
        Value::Object(map) => map,
        Value::Null => {
            return match schema.required.first() {
                Some(field) => Err(WorkflowError::MissingRequiredField(field.clone())),
                None => Ok(()),
            }
        }
        other => {
            return Err(WorkflowError::InvalidInputs(format!(
                "expected an object, got {}",
                type_name(other)
            )))
        }
    };

    for field in &schema.required {
        match object.get(field) {
            None | Some(Value::Null) => return Err(WorkflowError::MissingRequiredField(field.clone())),
            Some(_) => {}
        }
    }

    for (field, value) in object {
        if value.is_null() {
            continue;
        }
        let Some(expected) = schema.properties.get(field).and_then(|p| p.kind.as_deref()) else {
            continue;
        };
        if let Some(false) = matches_type(expected, value) {
            return Err(WorkflowError::InvalidFieldType {
                field: field.clone(),
                expected: expected.to_string(),
                actual: type_name(value).to_string(),
            });
        }
    }

    Ok(())
}

/// Whether `value` has the declared type; `None` for types that are not checked
fn matches_type(expected: &str, value: &Value) -> Option<bool> {
    let ok = match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => return None,
    };
    Some(ok)
}

/// JSON type name of a value, as reported in type errors
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
