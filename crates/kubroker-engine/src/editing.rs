//! Structured edits of rendered manifests, shared by service extensions.

use kubroker_cluster::manifest::{decode_values, encode_yaml};
use serde_json::{Map, Value};

use crate::extension::{ExtensionError, HookResult};

const WORKLOAD_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet"];

/// Decodes every document, applies `edit` to each, re-encodes as YAML.
pub fn edit_manifest<F>(manifest: &str, mut edit: F) -> HookResult<String>
where
    F: FnMut(&mut Value) -> HookResult<()>,
{
    let mut docs = decode_values(manifest).map_err(|e| ExtensionError::new(e.to_string()))?;
    for doc in &mut docs {
        edit(doc)?;
    }
    encode_yaml(&docs).map_err(|e| ExtensionError::new(e.to_string()))
}

pub fn kind_of(doc: &Value) -> &str {
    doc.get("kind").and_then(Value::as_str).unwrap_or_default()
}

pub fn namespace_of(doc: &Value) -> Option<&str> {
    doc.pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
}

/// Deployment, StatefulSet or DaemonSet.
pub fn is_workload(doc: &Value) -> bool {
    WORKLOAD_KINDS.contains(&kind_of(doc))
}

/// Walks `path` from `value`, creating empty objects where keys are missing.
///
/// Fails when an existing node along the path is not an object.
pub fn object_at<'a>(value: &'a mut Value, path: &[&str]) -> HookResult<&'a mut Map<String, Value>> {
    let mut cursor = value;
    for key in path {
        let map = cursor
            .as_object_mut()
            .ok_or_else(|| ExtensionError::new(format!("{key}: parent is not an object")))?;
        cursor = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    cursor
        .as_object_mut()
        .ok_or_else(|| ExtensionError::new(format!("{} is not an object", path.join("."))))
}

/// Containers of a workload's pod template.
pub fn pod_containers(doc: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
    doc.pointer_mut("/spec/template/spec/containers")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}
