//! In-process cluster used for dry runs and tests.
//!
//! Serves a fixed table of common kinds, stores objects in memory with
//! monotonically increasing resource versions, and journals every call so
//! tests can assert on exactly what the reconciler asked for.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::client::ClusterApi;
use crate::error::{ClusterError, Result};
use crate::pod::Pod;
use crate::resource::ResourceType;

const BUILTIN_KINDS: &[(&str, &str, &str, bool)] = &[
    ("v1", "Service", "services", true),
    ("v1", "ConfigMap", "configmaps", true),
    ("v1", "Secret", "secrets", true),
    ("v1", "PersistentVolumeClaim", "persistentvolumeclaims", true),
    ("v1", "Pod", "pods", true),
    ("v1", "ServiceAccount", "serviceaccounts", true),
    ("v1", "Namespace", "namespaces", false),
    ("apps/v1", "Deployment", "deployments", true),
    ("apps/v1", "StatefulSet", "statefulsets", true),
    ("apps/v1", "DaemonSet", "daemonsets", true),
    ("batch/v1", "Job", "jobs", true),
    ("policy/v1", "PodDisruptionBudget", "poddisruptionbudgets", true),
    ("networking.k8s.io/v1", "Ingress", "ingresses", true),
    ("route.openshift.io/v1", "Route", "routes", true),
    ("route.openshift.io/v1", "Router", "routers", true),
];

/// One call received by the in-memory cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Discover {
        api_version: String,
        kind: String,
    },
    Create {
        kind: String,
        namespace: String,
        name: String,
    },
    Get {
        kind: String,
        namespace: String,
        name: String,
    },
    Update {
        kind: String,
        namespace: String,
        name: String,
        resource_version: Option<String>,
    },
    Delete {
        kind: String,
        namespace: String,
        name: String,
    },
    ListPods {
        namespace: String,
        label_selector: String,
    },
}

type ObjectKey = (String, String, String, String);

#[derive(Debug, Default)]
pub struct InMemoryCluster {
    kinds: DashMap<(String, String), ResourceType>,
    /// (apiVersion, kind, namespace, name) -> object
    objects: DashMap<ObjectKey, Value>,
    pods: DashMap<String, Vec<Pod>>,
    version: AtomicU64,
    journal: Mutex<Vec<ClusterCall>>,
    failing_kinds: Mutex<HashSet<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn object_name(body: &Value) -> Option<&str> {
    body.pointer("/metadata/name").and_then(Value::as_str)
}

fn resource_version(body: &Value) -> Option<&str> {
    body.pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
}

fn set_resource_version(body: &mut Value, version: String) {
    if let Some(metadata) = body.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("resourceVersion".into(), Value::String(version));
    }
}

/// Matches a selector of comma-separated `key=value` terms.
fn labels_match(pod: &Pod, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => pod.metadata.labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => pod.metadata.labels.contains_key(term),
        })
}

impl InMemoryCluster {
    pub fn new() -> Self {
        let cluster = Self::default();
        for (api_version, kind, plural, namespaced) in BUILTIN_KINDS {
            cluster.register(ResourceType::new(api_version, *kind, *plural, *namespaced));
        }
        cluster
    }

    /// Makes an additional kind discoverable.
    pub fn register(&self, resource: ResourceType) {
        self.kinds
            .insert((resource.api_version(), resource.kind.clone()), resource);
    }

    /// Adds pods to `namespace`, visible to `list_pods`.
    pub fn add_pods(&self, namespace: &str, pods: impl IntoIterator<Item = Pod>) {
        self.pods
            .entry(namespace.to_string())
            .or_default()
            .extend(pods);
    }

    pub fn clear_pods(&self, namespace: &str) {
        self.pods.remove(namespace);
    }

    /// Makes every create, update and delete of `kind` fail with a server error.
    pub fn fail_kind(&self, kind: &str) {
        lock(&self.failing_kinds).insert(kind.to_string());
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        lock(&self.journal).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.journal).clear();
    }

    /// Stored object, if any.
    pub fn object(&self, api_version: &str, kind: &str, namespace: &str, name: &str) -> Option<Value> {
        let key = (
            api_version.to_string(),
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        );
        self.objects.get(&key).map(|o| o.value().clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn record(&self, call: ClusterCall) {
        debug!(?call, "In-memory cluster call");
        lock(&self.journal).push(call);
    }

    fn key(resource: &ResourceType, namespace: &str, name: &str) -> ObjectKey {
        let namespace = if resource.namespaced { namespace } else { "" };
        (
            resource.api_version(),
            resource.kind.clone(),
            namespace.to_string(),
            name.to_string(),
        )
    }

    fn check_failure(&self, kind: &str) -> Result<()> {
        if lock(&self.failing_kinds).contains(kind) {
            return Err(ClusterError::Api {
                status: 500,
                message: format!("injected failure for {kind}"),
            });
        }
        Ok(())
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn discover(&self, api_version: &str, kind: &str) -> Result<ResourceType> {
        self.record(ClusterCall::Discover {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        });
        self.kinds
            .get(&(api_version.to_string(), kind.to_string()))
            .map(|r| r.value().clone())
            .ok_or_else(|| ClusterError::discovery(api_version, kind))
    }

    async fn create(&self, resource: &ResourceType, namespace: &str, body: &Value) -> Result<Value> {
        let name = object_name(body)
            .ok_or_else(|| ClusterError::invalid_document("object has no metadata.name"))?
            .to_string();
        self.record(ClusterCall::Create {
            kind: resource.kind.clone(),
            namespace: namespace.to_string(),
            name: name.clone(),
        });
        self.check_failure(&resource.kind)?;

        if resource_version(body).is_some() {
            return Err(ClusterError::Api {
                status: 400,
                message: "resourceVersion should not be set on objects to be created".into(),
            });
        }

        let key = Self::key(resource, namespace, &name);
        if self.objects.contains_key(&key) {
            return Err(ClusterError::Api {
                status: 409,
                message: format!("{} {name:?} already exists", resource.plural),
            });
        }

        let mut stored = body.clone();
        set_resource_version(&mut stored, self.next_version());
        self.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get(&self, resource: &ResourceType, namespace: &str, name: &str) -> Result<Option<Value>> {
        self.record(ClusterCall::Get {
            kind: resource.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(self
            .objects
            .get(&Self::key(resource, namespace, name))
            .map(|o| o.value().clone()))
    }

    async fn update(
        &self,
        resource: &ResourceType,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value> {
        let sent_version = resource_version(body).map(str::to_string);
        self.record(ClusterCall::Update {
            kind: resource.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            resource_version: sent_version.clone(),
        });
        self.check_failure(&resource.kind)?;

        let key = Self::key(resource, namespace, name);
        let mut entry = self
            .objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::not_found(&resource.kind, namespace, name))?;

        let current = resource_version(entry.value()).map(str::to_string);
        if sent_version != current {
            return Err(ClusterError::Api {
                status: 409,
                message: format!(
                    "the object has been modified; expected resourceVersion {current:?}, got {sent_version:?}"
                ),
            });
        }

        let mut stored = body.clone();
        set_resource_version(&mut stored, self.next_version());
        *entry.value_mut() = stored.clone();
        Ok(stored)
    }

    async fn delete(&self, resource: &ResourceType, namespace: &str, name: &str) -> Result<()> {
        self.record(ClusterCall::Delete {
            kind: resource.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        self.check_failure(&resource.kind)?;
        self.objects
            .remove(&Self::key(resource, namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::not_found(&resource.kind, namespace, name))
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        self.record(ClusterCall::ListPods {
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        });
        Ok(self
            .pods
            .get(namespace)
            .map(|pods| {
                pods.iter()
                    .filter(|p| labels_match(p, label_selector))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
