use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClusterError, Result};

/// A concrete REST resource resolved from an apiVersion/kind pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    /// API group; empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lowercase plural used in URL paths, e.g. `statefulsets`.
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceType {
    pub fn new(
        api_version: &str,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// URL path prefix of the group version: `/api/v1` or `/apis/<group>/<version>`.
    pub fn group_version_path(&self) -> String {
        group_version_path(&self.api_version())
    }

    /// Path of the collection this resource lives in.
    pub fn collection_path(&self, namespace: &str) -> String {
        if self.namespaced && !namespace.is_empty() {
            format!(
                "{}/namespaces/{namespace}/{}",
                self.group_version_path(),
                self.plural
            )
        } else {
            format!("{}/{}", self.group_version_path(), self.plural)
        }
    }

    pub fn object_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

/// Splits `apps/v1` into `("apps", "v1")` and `v1` into `("", "v1")`.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

pub fn group_version_path(api_version: &str) -> String {
    match split_api_version(api_version) {
        ("", version) => format!("/api/{version}"),
        (group, version) => format!("/apis/{group}/{version}"),
    }
}

/// One decoded manifest document.
///
/// The identifying fields are lifted out of `body` for convenience; `body`
/// stays the source of truth and is what gets sent to the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub body: Value,
}

impl ResourceDocument {
    /// # Errors
    ///
    /// Fails when the value is not an object or lacks `apiVersion`, `kind`
    /// or `metadata.name`.
    pub fn from_value(body: Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| ClusterError::invalid_document("document is not an object"))?;

        let field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let api_version =
            field("apiVersion").ok_or_else(|| ClusterError::invalid_document("missing apiVersion"))?;
        let kind = field("kind").ok_or_else(|| ClusterError::invalid_document("missing kind"))?;

        let metadata = obj.get("metadata").and_then(Value::as_object);
        let meta_str = |key: &str| {
            metadata
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let name = meta_str("name");
        if name.is_empty() {
            return Err(ClusterError::invalid_document(format!(
                "{kind} document has no metadata.name"
            )));
        }
        let namespace = meta_str("namespace");

        Ok(Self {
            api_version,
            kind,
            namespace,
            name,
            body,
        })
    }

    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.body
            .as_object_mut()?
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.body
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Sets or clears `metadata.resourceVersion`.
    pub fn set_resource_version(&mut self, version: Option<&str>) {
        let Some(metadata) = self.metadata_mut() else {
            return;
        };
        match version {
            Some(v) => {
                metadata.insert("resourceVersion".into(), Value::String(v.to_string()));
            }
            None => {
                metadata.remove("resourceVersion");
            }
        }
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("namespace".into(), Value::String(namespace.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths() {
        let svc = ResourceType::new("v1", "Service", "services", true);
        assert_eq!(svc.api_version(), "v1");
        assert_eq!(
            svc.object_path("ns1", "app1"),
            "/api/v1/namespaces/ns1/services/app1"
        );

        let sts = ResourceType::new("apps/v1", "StatefulSet", "statefulsets", true);
        assert_eq!(sts.api_version(), "apps/v1");
        assert_eq!(
            sts.collection_path("ns1"),
            "/apis/apps/v1/namespaces/ns1/statefulsets"
        );

        let ns = ResourceType::new("v1", "Namespace", "namespaces", false);
        assert_eq!(ns.object_path("ignored", "ns1"), "/api/v1/namespaces/ns1");
    }

    #[test]
    fn test_from_value() {
        let doc = ResourceDocument::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "app1", "namespace": "ns1", "resourceVersion": "7"},
        }))
        .unwrap();
        assert_eq!(doc.kind, "Service");
        assert_eq!(doc.namespace, "ns1");
        assert_eq!(doc.name, "app1");
        assert_eq!(doc.resource_version(), Some("7"));
    }

    #[test]
    fn test_from_value_rejects_incomplete_documents() {
        assert!(ResourceDocument::from_value(json!("text")).is_err());
        assert!(ResourceDocument::from_value(json!({"kind": "Service"})).is_err());
        assert!(
            ResourceDocument::from_value(json!({"apiVersion": "v1", "kind": "Service"})).is_err()
        );
    }

    #[test]
    fn test_resource_version_and_namespace_edits() {
        let mut doc = ResourceDocument::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg", "resourceVersion": "3"},
        }))
        .unwrap();

        doc.set_resource_version(None);
        assert_eq!(doc.resource_version(), None);
        assert!(doc.body["metadata"].get("resourceVersion").is_none());

        doc.set_resource_version(Some("9"));
        assert_eq!(doc.body["metadata"]["resourceVersion"], json!("9"));

        doc.set_namespace("default");
        assert_eq!(doc.namespace, "default");
        assert_eq!(doc.body["metadata"]["namespace"], json!("default"));
    }
}
