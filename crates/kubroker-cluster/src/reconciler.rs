//! Applies rendered manifests to the cluster and inspects the pods they produce.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, info};

use crate::client::DynClusterApi;
use crate::error::Result;
use crate::manifest::documents;
use crate::pod::Pod;
use crate::resource::{ResourceDocument, ResourceType};

/// Namespace used for namespaced documents that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace -> name of every Service-kind document touched by one apply pass.
pub type ServiceMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Always create; any stale resourceVersion on the document is cleared.
    Create,
    /// Update in place when an object of the same name exists, create otherwise.
    CreateOrUpdate,
}

/// Selects which documents of a manifest an apply pass touches, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    All,
    Only(&'static [&'static str]),
    Except(&'static [&'static str]),
}

impl KindFilter {
    /// First pass of provision and update.
    pub const SERVICES: Self = Self::Only(&["Service"]);
    /// Second pass of provision.
    pub const PROVISION_REMAINDER: Self = Self::Except(&["Service", "Ingress"]);
    /// Second pass of update.
    pub const UPDATE_REMAINDER: Self = Self::Except(&["Service", "Ingress", "Router"]);

    pub fn matches(&self, kind: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(&kind),
            Self::Except(kinds) => !kinds.contains(&kind),
        }
    }
}

/// Outcome of inspecting an instance's pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every container is ready (or there are no pods).
    Ready,
    /// Some container is not ready yet and none has failed.
    Creating,
    /// At least one container is stuck waiting for something other than creation.
    Failed,
}

impl Readiness {
    /// Folds container statuses: any failure wins, then any not-ready.
    ///
    /// Only reported container statuses count. An empty pod list, or pods
    /// still pending without statuses, fold to `Ready`, so a poll issued
    /// before the workload controller has created pods reports ready.
    pub fn of_pods(pods: &[Pod]) -> Self {
        let (mut total, mut ready, mut failed) = (0usize, 0usize, 0usize);
        for status in pods.iter().flat_map(|p| &p.status.container_statuses) {
            total += 1;
            if status.ready {
                ready += 1;
            } else if status.has_failed() {
                failed += 1;
            }
        }

        if failed > 0 {
            Self::Failed
        } else if ready != total {
            Self::Creating
        } else {
            Self::Ready
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Creating => write!(f, "creating"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Makes the cluster match a manifest, one document at a time.
///
/// There is no rollback: when a document fails, documents applied before it
/// stay in the cluster and the error is returned as-is.
#[derive(Clone)]
pub struct Reconciler {
    api: DynClusterApi,
    instance_label: String,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("instance_label", &self.instance_label)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(api: DynClusterApi, instance_label: impl Into<String>) -> Self {
        Self {
            api,
            instance_label: instance_label.into(),
        }
    }

    pub fn instance_label(&self) -> &str {
        &self.instance_label
    }

    async fn resolve(&self, doc: &mut ResourceDocument) -> Result<ResourceType> {
        let resource = self
            .api
            .discover(&doc.api_version, &doc.kind)
            .await
            .inspect_err(|e| error!(api_version = %doc.api_version, kind = %doc.kind, error = %e, "Resource discovery failed"))?;
        if doc.namespace.is_empty() && resource.namespaced {
            doc.set_namespace(DEFAULT_NAMESPACE);
        }
        Ok(resource)
    }

    /// Applies every document whose kind passes `filter`.
    ///
    /// # Errors
    ///
    /// The first decode, discovery, create or update failure aborts the pass.
    pub async fn apply_filtered(
        &self,
        manifest: &str,
        filter: KindFilter,
        mode: ApplyMode,
    ) -> Result<ServiceMap> {
        let mut services = ServiceMap::new();

        for doc in documents(manifest) {
            let mut doc = doc.inspect_err(|e| error!(error = %e, "Failed to decode manifest document"))?;
            if !filter.matches(&doc.kind) {
                continue;
            }
            let resource = self.resolve(&mut doc).await?;

            match mode {
                ApplyMode::Create => self.create(&resource, &mut doc).await?,
                ApplyMode::CreateOrUpdate => {
                    match self.api.get(&resource, &doc.namespace, &doc.name).await? {
                        None => self.create(&resource, &mut doc).await?,
                        Some(existing) => {
                            let version = existing
                                .pointer("/metadata/resourceVersion")
                                .and_then(serde_json::Value::as_str)
                                .map(str::to_string);
                            doc.set_resource_version(version.as_deref());
                            self.api
                                .update(&resource, &doc.namespace, &doc.name, &doc.body)
                                .await
                                .inspect_err(|e| {
                                    error!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, error = %e, "Failed to update resource")
                                })?;
                            info!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, "Updated resource");
                        }
                    }
                }
            }

            if doc.kind == "Service" {
                services.insert(doc.namespace.clone(), doc.name.clone());
            }
        }

        Ok(services)
    }

    async fn create(&self, resource: &ResourceType, doc: &mut ResourceDocument) -> Result<()> {
        doc.set_resource_version(None);
        self.api
            .create(resource, &doc.namespace, &doc.body)
            .await
            .inspect_err(|e| {
                error!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, error = %e, "Failed to create resource")
            })?;
        info!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, "Created resource");
        Ok(())
    }

    /// Deletes every document of a manifest. Objects already gone are skipped.
    pub async fn delete(&self, manifest: &str) -> Result<()> {
        for doc in documents(manifest) {
            let mut doc = doc?;
            let resource = self.resolve(&mut doc).await?;
            match self.api.delete(&resource, &doc.namespace, &doc.name).await {
                Ok(()) => {
                    info!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, "Deleted resource")
                }
                Err(e) if e.is_not_found() => {
                    debug!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, "Resource already absent")
                }
                Err(e) => {
                    error!(kind = %doc.kind, namespace = %doc.namespace, name = %doc.name, error = %e, "Failed to delete resource");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Inspects the pods labelled with the instance ID.
    pub async fn check_readiness(&self, instance_id: &str, namespace: &str) -> Result<Readiness> {
        let selector = format!("{}={instance_id}", self.instance_label);
        let pods = self
            .api
            .list_pods(namespace, &selector)
            .await
            .inspect_err(|e| error!(instance_id, namespace, error = %e, "Failed to list instance pods"))?;
        let readiness = Readiness::of_pods(&pods);
        debug!(instance_id, namespace, pods = pods.len(), %readiness, "Checked instance readiness");
        Ok(readiness)
    }
}
