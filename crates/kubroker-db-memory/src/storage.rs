use async_trait::async_trait;
use kubroker_core::InstanceRecord;
use kubroker_storage::{InstanceStore, StorageError};
use papaya::HashMap as PapayaHashMap;
use tracing::debug;

/// In-memory instance store using a papaya lock-free HashMap keyed by instance ID.
#[derive(Debug, Default)]
pub struct InMemoryInstanceStore {
    data: PapayaHashMap<String, InstanceRecord>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn insert(&self, record: &InstanceRecord) -> Result<(), StorageError> {
        let guard = self.data.pin();
        if guard
            .try_insert(record.instance_id.clone(), record.clone())
            .is_err()
        {
            return Err(StorageError::already_exists(&record.instance_id));
        }
        debug!(instance_id = %record.instance_id, "Stored instance record");
        Ok(())
    }

    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StorageError> {
        Ok(self.data.pin().get(instance_id).cloned())
    }

    async fn update(&self, record: &InstanceRecord) -> Result<(), StorageError> {
        let guard = self.data.pin();
        let updated = guard.update(record.instance_id.clone(), |current| InstanceRecord {
            plan_id: record.plan_id.clone(),
            parameters: record.parameters.clone(),
            manifest: record.manifest.clone(),
            updated_at: record.updated_at,
            ..current.clone()
        });
        match updated {
            Some(_) => Ok(()),
            None => Err(StorageError::not_found(&record.instance_id)),
        }
    }

    async fn delete(&self, instance_id: &str) -> Result<bool, StorageError> {
        Ok(self.data.pin().remove(instance_id).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
