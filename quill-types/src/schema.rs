//! JSON-Schema sanitization for tool export.
//!
//! The export subset excludes `$schema`, `$id`, `$ref`, `propertyNames`,
//! `patternProperties`, and `examples`. Gemini-style consumers additionally
//! need `exclusiveMinimum`/`exclusiveMaximum` folded into plain bounds.
//! Shared between the tool registry's export pass and the Gemini transform.

/// Schema dialect expected by the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaTarget {
    /// JSON-Schema Draft 2020-12 subset (Anthropic, OpenAI).
    #[default]
    Standard,
    /// Gemini function-declaration schema.
    Gemini,
}

/// Keys stripped from every exported schema.
const STRIPPED_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "propertyNames",
    "patternProperties",
    "examples",
];

/// Produce a sanitized copy of `schema` for the given target.
///
/// Recurses through `properties`, `items`, and schema-valued members.
#[must_use]
pub fn sanitize_schema(schema: &serde_json::Value, target: SchemaTarget) -> serde_json::Value {
    let mut out = schema.clone();
    sanitize_in_place(&mut out, target);
    out
}

fn sanitize_in_place(value: &mut serde_json::Value, target: SchemaTarget) {
    match value {
        serde_json::Value::Object(obj) => {
            for key in STRIPPED_KEYS {
                obj.remove(*key);
            }
            if target == SchemaTarget::Gemini {
                // exclusiveMinimum/Maximum fold into the inclusive bounds.
                if let Some(bound) = obj.remove("exclusiveMinimum") {
                    obj.entry("minimum").or_insert(bound);
                }
                if let Some(bound) = obj.remove("exclusiveMaximum") {
                    obj.entry("maximum").or_insert(bound);
                }
            }
            for child in obj.values_mut() {
                sanitize_in_place(child, target);
            }
        }
        serde_json::Value::Array(items) => {
            for child in items {
                sanitize_in_place(child, target);
            }
        }
        _ => {}
    }
}
