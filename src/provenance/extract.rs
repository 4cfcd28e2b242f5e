//! Origin extraction and value resolution.
//!
//! Before a tool receives its arguments, two passes run over them:
//! extraction collects which prior call ids contributed to each
//! argument (sink analysis), and resolution strips every carrier so
//! the tool sees plain data.

use crate::types::CallId;
use crate::workflow::value::{TrackedValue, Value};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};

/// Recursively collects all origin call ids reachable from a value.
///
/// Traversal enters maps, lists and carriers; a carrier contributes its
/// own origin set plus whatever its raw content holds.
#[must_use]
pub fn extract_origins(value: &TrackedValue) -> BTreeSet<CallId> {
    let mut origins = BTreeSet::new();
    collect(value, &mut origins);
    origins
}

fn collect(value: &TrackedValue, origins: &mut BTreeSet<CallId>) {
    origins.extend(value.origins.iter().cloned());
    match &value.raw {
        Value::List(items) => {
            for item in items {
                collect(item, origins);
            }
        }
        Value::Map(map) => {
            for item in map.values() {
                collect(item, origins);
            }
        }
        _ => {}
    }
}

/// Per-argument origin extraction.
///
/// Returns a map from argument name to the sorted call ids that
/// contributed to it; arguments with empty origin sets are omitted.
#[must_use]
pub fn extract_per_arg(kwargs: &[(String, TrackedValue)]) -> BTreeMap<String, Vec<CallId>> {
    let mut result = BTreeMap::new();
    for (name, value) in kwargs {
        let origins = extract_origins(value);
        if !origins.is_empty() {
            result.insert(name.clone(), origins.into_iter().collect());
        }
    }
    result
}

/// Recursively unwraps every carrier in a value, yielding the raw JSON
/// structure a tool expects.
#[must_use]
pub fn resolve_value(value: &TrackedValue) -> Json {
    value.raw.to_json()
}
