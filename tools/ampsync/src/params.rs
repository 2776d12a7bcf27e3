//! Task parameter normalisation
//!
//! Template tasks carry parameter names as the template's panel knows them;
//! a target's method catalog may spell the same parameter differently
//! (`value_to_check` vs `ValueToCheck`). Keys are matched on a normalised form
//! and re-emitted under the target's canonical names.

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};

use crate::panel::MethodInfo;

/// Task parameter mapping: parameter name -> stringified value
pub type ParameterMapping = BTreeMap<String, String>;

/// Method id -> ordered parameter names the method consumes
pub type ConsumesMap = HashMap<String, Vec<String>>;

/// Lower-case and strip everything that is not alphanumeric
pub fn normalize_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Stringify a panel value the way the panel expects it back
///
/// Booleans become `true`/`false`, null becomes empty, numbers and strings
/// keep their text, anything structured becomes compact JSON.
pub fn serialize_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        structured => structured.to_string(),
    }
}

/// Build the method catalog from a target's available methods
pub fn build_consumes_map(methods: &[MethodInfo]) -> ConsumesMap {
    methods
        .iter()
        .filter(|m| !m.id.trim().is_empty())
        .map(|m| {
            let names = m
                .consumes
                .iter()
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            (m.id.trim().to_string(), names)
        })
        .collect()
}

/// Re-key `mapping` onto the parameter names the target method declares
///
/// Returns the mapping unchanged when the method declares nothing or when no
/// key matches. Otherwise only the canonical keys are returned, so stale
/// aliases never reach the panel next to their canonical twin.
pub fn remap_parameters(
    method_id: &str,
    mapping: &ParameterMapping,
    consumes: &ConsumesMap,
) -> ParameterMapping {
    let expected = match consumes.get(method_id) {
        Some(names) if !names.is_empty() => names,
        _ => return mapping.clone(),
    };

    let by_norm: HashMap<String, &String> = mapping
        .iter()
        .map(|(key, value)| (normalize_key(key), value))
        .collect();

    let remapped: ParameterMapping = expected
        .iter()
        .filter_map(|name| {
            by_norm
                .get(&normalize_key(name))
                .map(|value| (name.clone(), (*value).clone()))
        })
        .collect();

    if remapped.is_empty() {
        mapping.clone()
    } else {
        remapped
    }
}
