use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::pod::Pod;
use crate::resource::ResourceType;

/// Typed access to the cluster API.
///
/// Object bodies are the raw JSON documents the API server accepts and
/// returns. Implementations own their transport timeouts and must be
/// `Send + Sync`; one client is shared across every in-flight operation.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Resolves an apiVersion/kind pair to its REST resource type.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Discovery` when the server serves no such kind.
    async fn discover(&self, api_version: &str, kind: &str) -> Result<ResourceType>;

    /// Creates an object and returns the stored body.
    async fn create(&self, resource: &ResourceType, namespace: &str, body: &Value)
    -> Result<Value>;

    /// Fetches an object, `None` if it does not exist.
    async fn get(&self, resource: &ResourceType, namespace: &str, name: &str)
    -> Result<Option<Value>>;

    /// Replaces an object. The body must carry the current resourceVersion.
    async fn update(
        &self,
        resource: &ResourceType,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns a not-found error (see `ClusterError::is_not_found`) when the
    /// object does not exist.
    async fn delete(&self, resource: &ResourceType, namespace: &str, name: &str) -> Result<()>;

    /// Lists pods in `namespace` matching a label selector such as `key=value`.
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;
}

/// Shared handle to a cluster client.
pub type DynClusterApi = std::sync::Arc<dyn ClusterApi>;
