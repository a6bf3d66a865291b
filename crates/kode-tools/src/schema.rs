// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
//! Structural validation of tool input against the tool's JSON Schema.
//!
//! This is deliberately not a full JSON Schema engine: required properties
//! and primitive type tags cover every built-in tool, and MCP tool input is
//! validated by the remote server anyway.

use serde_json::Value;

/// Check `input` against `schema`.  Returns a human-readable message naming
/// the first violation found.
pub fn validate_against_schema(schema: &Value, input: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !input.is_object() {
        return Err(format!(
            "expected an input object, got: {}",
            type_name(input)
        ));
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if input.get(name).map_or(true, Value::is_null) {
                return Err(format!("missing required parameter '{name}'"));
            }
        }
    }

    if let (Some(props), Some(obj)) = (properties, input.as_object()) {
        for (name, value) in obj {
            let Some(prop) = props.get(name) else {
                continue;
            };
            if let Some(expected) = prop.get("type").and_then(Value::as_str) {
                if !matches_type(value, expected) {
                    return Err(format!(
                        "parameter '{name}' must be of type {expected}, got: {}",
                        type_name(value)
                    ));
                }
            }
        }
    }

    Ok(())
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
