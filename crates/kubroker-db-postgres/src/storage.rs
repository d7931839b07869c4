//! PostgreSQL implementation of the InstanceStore trait.

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use tracing::debug;

use kubroker_core::InstanceRecord;
use kubroker_storage::{InstanceStore, StorageError};

use crate::config::PostgresConfig;
use crate::queries::instances;
use crate::{migrations, pool};

/// PostgreSQL-backed instance store.
#[derive(Debug, Clone)]
pub struct PostgresInstanceStore {
    pool: PgPool,
}

impl PostgresInstanceStore {
    /// Connects a pool and, if configured, runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if migrations fail.
    pub async fn new(config: &PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Wraps an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InstanceStore for PostgresInstanceStore {
    async fn insert(&self, record: &InstanceRecord) -> Result<(), StorageError> {
        instances::insert(&self.pool, record).await?;
        debug!(instance_id = %record.instance_id, "Inserted instance record");
        Ok(())
    }

    async fn get(&self, instance_id: &str) -> Result<Option<InstanceRecord>, StorageError> {
        instances::select(&self.pool, instance_id).await
    }

    async fn update(&self, record: &InstanceRecord) -> Result<(), StorageError> {
        instances::update(&self.pool, record).await
    }

    async fn delete(&self, instance_id: &str) -> Result<bool, StorageError> {
        instances::delete(&self.pool, instance_id).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        pool::ping(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
