//! Helpers for the free-form parameter map carried by every request.

use serde_json::{Map, Value};

/// Caller parameters as received on the wire.
pub type Parameters = Map<String, Value>;

/// Parameter naming the target namespace of an instance.
pub const NAMESPACE_PARAM: &str = "NAMESPACE";
/// Parameter naming the instance inside its namespace.
pub const INSTANCE_NAME_PARAM: &str = "INSTANCE_NAME";

/// Returns the parameter as a string.
///
/// Strings are returned as-is, other scalars in their JSON form. A missing,
/// null or empty value is `None`.
pub fn string_param(params: &Parameters, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Overlays `overrides` on top of `base`, key by key.
pub fn merge_params(base: &Parameters, overrides: &Parameters) -> Parameters {
    let mut merged = base.clone();
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
