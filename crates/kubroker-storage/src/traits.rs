use async_trait::async_trait;
use kubroker_core::InstanceRecord;

use crate::error::StorageError;

/// Persistence of instance records keyed by instance ID.
///
/// Implementations must be thread-safe (`Send + Sync`) and provide their own
/// internal concurrency control; the broker shares one store across all
/// in-flight operations.
///
/// # Example
///
/// ```ignore
/// use kubroker_storage::{InstanceStore, StorageError};
///
/// async fn namespace_of(store: &dyn InstanceStore, id: &str) -> Result<String, StorageError> {
///     store
///         .get(id)
///         .await?
///         .map(|r| r.namespace)
///         .ok_or_else(|| StorageError::not_found(id))
/// }
/// ```
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a record with the same
    /// instance ID is already stored.
    async fn insert(&self, record: &InstanceRecord) -> Result<(), StorageError>;

    /// Loads a record by instance ID.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing records.
    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StorageError>;

    /// Replaces the mutable fields of a stored record: plan ID, parameters,
    /// manifest and updated-at. Identity fields are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record exists for the instance ID.
    async fn update(&self, record: &InstanceRecord) -> Result<(), StorageError>;

    /// Removes a record. Returns `false` if there was nothing to remove.
    async fn delete(&self, instance_id: &str) -> Result<bool, StorageError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Short backend name for logs and readiness output.
    fn backend_name(&self) -> &'static str;
}
