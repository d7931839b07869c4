//! Connection pool for the PostgreSQL instance store.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Recycle connections after half an hour unless configured otherwise.
const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Bounded pool settings derived from `config`.
///
/// The idle floor defaults to a quarter of the pool and is kept within
/// `1..=pool_size`.
pub fn pool_options(config: &PostgresConfig) -> Result<PgPoolOptions> {
    if config.pool_size == 0 {
        return Err(PostgresError::config("pool_size must be greater than zero"));
    }

    let min_connections = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .clamp(1, config.pool_size);
    let max_lifetime = config
        .max_lifetime_secs
        .unwrap_or(DEFAULT_MAX_LIFETIME_SECS);

    Ok(PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
        .max_lifetime(Duration::from_secs(max_lifetime))
        .test_before_acquire(false))
}

#[instrument(skip(config), fields(url = %config.redacted_url()))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let options = pool_options(config)?;
    info!(
        pool_size = options.get_max_connections(),
        min_connections = options.get_min_connections(),
        connect_timeout_ms = config.connect_timeout_ms,
        "Opening instance store pool"
    );

    let pool = options.connect(&config.connection_url()).await?;
    debug!("Instance store pool ready");
    Ok(pool)
}

/// Round-trips a trivial query; backs the readiness probe.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx_core::query::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(PostgresError::from)?;
    Ok(())
}
