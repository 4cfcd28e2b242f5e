//! JSON Schema inference and normalization for tool specs.
//!
//! Local functions register with typed parameter and return structs;
//! their schemas derive via schemars and are normalized into the plain
//! inline objects the MCP surface expects. Remote tool schemas pass
//! through the same normalization plus the scalar-unwrap rewrite.

use schemars::JsonSchema;
use serde_json::{Map, Value as Json};

/// Derives the input schema for a typed parameter struct.
///
/// Non-optional fields of the struct are exactly the schema's
/// `required` list.
#[must_use]
pub fn input_schema_for<T: JsonSchema>() -> Json {
    normalize(raw_schema_for::<T>())
}

/// Derives the output schema for a typed return value.
#[must_use]
pub fn output_schema_for<T: JsonSchema>() -> Json {
    normalize(raw_schema_for::<T>())
}

/// Schema for tools with no return value.
#[must_use]
pub fn null_schema() -> Json {
    serde_json::json!({ "type": "null" })
}

fn raw_schema_for<T: JsonSchema>() -> Json {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| Json::Object(Map::new()))
}

/// Normalizes a generated schema into a plain inline object:
/// strips generator metadata and resolves local `$defs` references.
#[must_use]
pub fn normalize(mut schema: Json) -> Json {
    let defs = match &mut schema {
        Json::Object(obj) => {
            obj.remove("$schema");
            obj.remove("title");
            obj.remove("$defs")
        }
        _ => None,
    };
    match defs {
        Some(Json::Object(defs)) => inline_refs(schema, &defs),
        _ => schema,
    }
}

fn inline_refs(schema: Json, defs: &Map<String, Json>) -> Json {
    match schema {
        Json::Object(obj) => {
            if let Some(Json::String(reference)) = obj.get("$ref") {
                if let Some(name) = reference.strip_prefix("#/$defs/") {
                    if let Some(target) = defs.get(name) {
                        let mut resolved = inline_refs(target.clone(), defs);
                        if let Json::Object(resolved) = &mut resolved {
                            resolved.remove("title");
                            // Keys alongside $ref (e.g. description) win
                            for (key, value) in &obj {
                                if key != "$ref" {
                                    resolved.insert(key.clone(), value.clone());
                                }
                            }
                        }
                        return resolved;
                    }
                }
            }
            Json::Object(
                obj.into_iter()
                    .map(|(key, value)| (key, inline_refs(value, defs)))
                    .collect(),
            )
        }
        Json::Array(items) => {
            Json::Array(items.into_iter().map(|v| inline_refs(v, defs)).collect())
        }
        other => other,
    }
}

/// Applies the scalar-unwrap rule to a remote tool's output schema.
///
/// A remote tool returning a scalar conventionally declares its output
/// as an object with the single property `result`; such schemas
/// rewrite to the inner schema at registration. Multi-field objects
/// pass through unchanged (`None`).
#[must_use]
pub fn unwrap_result_schema(schema: &Json) -> Option<Json> {
    let obj = schema.as_object()?;
    if obj.get("type").and_then(Json::as_str) != Some("object") {
        return None;
    }
    let properties = obj.get("properties")?.as_object()?;
    if properties.len() != 1 {
        return None;
    }
    properties.get("result").cloned()
}

/// Whether a structured remote result needs its `{"result": v}`
/// wrapper stripped (the schema-side twin of [`unwrap_result_schema`]).
#[must_use]
pub fn unwrap_result_value(value: Json) -> Json {
    match value {
        Json::Object(mut obj) if obj.len() == 1 && obj.contains_key("result") => {
            obj.remove("result").unwrap_or(Json::Null)
        }
        other => other,
    }
}

/// The schema's `required` field names.
#[must_use]
pub fn required_fields(schema: &Json) -> Vec<String> {
    schema
        .get("required")
        .and_then(Json::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Argument names and descriptions from an input schema's properties,
/// in declaration-independent (sorted) order. Feeds the search index.
#[must_use]
pub fn property_texts(schema: &Json) -> Vec<(String, Option<String>)> {
    let Some(properties) = schema.get("properties").and_then(Json::as_object) else {
        return Vec::new();
    };
    properties
        .iter()
        .map(|(name, prop)| {
            let description = prop
                .get("description")
                .and_then(Json::as_str)
                .map(str::to_string);
            (name.clone(), description)
        })
        .collect()
}

/// Keeps the first non-empty line of a registration-site description,
/// mirroring how docstrings collapse to summaries.
#[must_use]
pub fn summary_line(description: &str) -> String {
    description
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}
