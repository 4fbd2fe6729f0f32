//! Lightweight input validation against tool schemas.
//!
//! The sanitizer used for export lives in `quill_types::schema` (shared
//! with the Gemini transform) and is re-exported here for registry callers.

pub use quill_types::schema::{SchemaTarget, sanitize_schema};
use quill_types::ToolError;

/// Validate a JSON input value against a tool's input schema.
///
/// Lightweight structural checks only: object-ness, `required` fields, and
/// declared property types. Catches the obvious model mistakes before the
/// tool executes, without a full JSON Schema engine.
///
/// # Errors
///
/// Returns [`ToolError::InvalidInput`] naming the first mismatch.
pub fn validate_input(input: &serde_json::Value, schema: &serde_json::Value) -> Result<(), ToolError> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };

    if let Some(serde_json::Value::String(ty)) = schema_obj.get("type")
        && ty == "object"
        && !input.is_object()
    {
        return Err(ToolError::InvalidInput("expected object input".to_string()));
    }

    let Some(input_obj) = input.as_object() else {
        return Ok(());
    };

    if let Some(serde_json::Value::Array(required)) = schema_obj.get("required") {
        for field in required {
            if let Some(field_name) = field.as_str()
                && !input_obj.contains_key(field_name)
            {
                return Err(ToolError::InvalidInput(format!(
                    "missing required field: {field_name}"
                )));
            }
        }
    }

    if let Some(serde_json::Value::Object(properties)) = schema_obj.get("properties") {
        for (field_name, prop_schema) in properties {
            if let Some(value) = input_obj.get(field_name)
                && let Some(serde_json::Value::String(expected_type)) = prop_schema.get("type")
                && !json_type_matches(value, expected_type)
            {
                return Err(ToolError::InvalidInput(format!(
                    "field '{field_name}' expected type '{expected_type}', got {}",
                    json_type_name(value)
                )));
            }
        }
    }

    Ok(())
}

fn json_type_matches(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_accepts_matching_input() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        });
        assert!(validate_input(&json!({"path": "foo.txt"}), &schema).is_ok());
    }

    #[test]
    fn validate_rejects_missing_required_field() {
        let schema = json!({"type": "object", "required": ["path"]});
        let err = validate_input(&json!({}), &schema).unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let schema = json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}}
        });
        let err = validate_input(&json!({"count": "three"}), &schema).unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[test]
    fn validate_rejects_non_object_input() {
        let schema = json!({"type": "object"});
        assert!(validate_input(&json!("not an object"), &schema).is_err());
    }

    #[test]
    fn validate_passes_schemaless_tools() {
        assert!(validate_input(&json!({"anything": 1}), &json!(true)).is_ok());
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        });
        assert!(validate_input(&json!({"path": "a", "verbose": true}), &schema).is_ok());
    }
}
